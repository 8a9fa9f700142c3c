//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{ProductId, UserId};
use domain::{
    Money, NewOrder, Order, OrderEvent, OrderItem, OrderNumber, OrderStatus, PaymentMethod,
    PricingPolicy, Product, ProductStatus, ShippingDetails,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{PostgresStore, Store, StoreError, StoreTx};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_marketplace_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_events, orders, cart_items, carts, products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn product(price_cents: i64, stock: u32) -> Product {
    Product::new(
        UserId::new(),
        "Beeswax Wrap",
        "BW-1",
        Money::from_cents(price_cents),
        stock,
    )
    .with_image("wrap.png")
}

fn shipping() -> ShippingDetails {
    ShippingDetails {
        name: "Test Customer".into(),
        email: "customer@example.com".into(),
        phone: "555-0000".into(),
        address: "1 Test Rd".into(),
        city: "Testville".into(),
        state: "TS".into(),
        zip_code: "12345".into(),
        country: "USA".into(),
        notes: None,
    }
}

fn order_for(p: &Product, customer: UserId, number: &str) -> (Order, OrderEvent) {
    Order::place(
        NewOrder {
            order_number: OrderNumber::from(number),
            customer_id: customer,
            items: vec![OrderItem::snapshot(p, 1)],
            shipping: shipping(),
            payment_method: PaymentMethod::default(),
        },
        &PricingPolicy::default(),
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn product_round_trip() {
    let store = get_test_store().await;
    let p = product(1299, 7).with_status(ProductStatus::Draft);
    store.upsert_product(&p).await.unwrap();

    let loaded = store.product(p.id).await.unwrap().unwrap();
    assert_eq!(loaded, p);

    assert!(store.remove_product(p.id).await.unwrap());
    assert!(store.product(p.id).await.unwrap().is_none());
    assert!(!store.remove_product(p.id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn rolled_back_stock_write_is_invisible() {
    let store = get_test_store().await;
    let p = product(500, 3);
    store.upsert_product(&p).await.unwrap();

    {
        let mut tx = store.begin().await.unwrap();
        tx.write_stock(p.id, 0).await.unwrap();
    }

    assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 3);
}

#[tokio::test]
#[serial]
async fn cart_lines_persist() {
    let store = get_test_store().await;
    let user = UserId::new();
    let a = ProductId::new();
    let b = ProductId::new();

    let mut tx = store.begin().await.unwrap();
    let mut cart = tx.cart_for_update(user).await.unwrap();
    cart.add(a, 2).unwrap();
    cart.add(b, 1).unwrap();
    tx.save_cart(&cart).await.unwrap();
    tx.commit().await.unwrap();

    let loaded = store.cart(user).await.unwrap();
    assert_eq!(loaded.lines().len(), 2);
    assert_eq!(loaded.line_for_product(a).unwrap().quantity, 2);

    let mut tx = store.begin().await.unwrap();
    let mut cart = tx.cart_for_update(user).await.unwrap();
    cart.clear();
    tx.save_cart(&cart).await.unwrap();
    tx.commit().await.unwrap();

    assert!(store.cart(user).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn largest_line_quantity_is_storable() {
    let store = get_test_store().await;
    let user = UserId::new();
    let product_id = ProductId::new();

    let mut tx = store.begin().await.unwrap();
    let mut cart = tx.cart_for_update(user).await.unwrap();
    cart.add(product_id, i64::from(domain::MAX_LINE_QUANTITY)).unwrap();
    tx.save_cart(&cart).await.unwrap();
    tx.commit().await.unwrap();

    let loaded = store.cart(user).await.unwrap();
    assert_eq!(
        loaded.line_for_product(product_id).unwrap().quantity,
        domain::MAX_LINE_QUANTITY
    );
}

#[tokio::test]
#[serial]
async fn unknown_user_has_empty_cart() {
    let store = get_test_store().await;
    assert!(store.cart(UserId::new()).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn duplicate_order_number_keeps_transaction_usable() {
    let store = get_test_store().await;
    let p = product(1000, 5);
    store.upsert_product(&p).await.unwrap();
    let customer = UserId::new();

    let (first, _) = order_for(&p, customer, "ORD-1-1");
    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&first).await.unwrap();
    tx.commit().await.unwrap();

    let (clash, _) = order_for(&p, customer, "ORD-1-1");
    let mut tx = store.begin().await.unwrap();
    assert!(tx.order_number_exists(clash.order_number()).await.unwrap());
    assert!(matches!(
        tx.insert_order(&clash).await,
        Err(StoreError::DuplicateOrderNumber(_))
    ));

    let (retry, _) = order_for(&p, customer, "ORD-1-2");
    tx.insert_order(&retry).await.unwrap();
    tx.commit().await.unwrap();

    let orders = store.orders_for_customer(customer).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].id(), retry.id());
}

#[tokio::test]
#[serial]
async fn order_update_and_history() {
    let store = get_test_store().await;
    let p = product(1000, 5);
    store.upsert_product(&p).await.unwrap();

    let (mut order, placed) = order_for(&p, UserId::new(), "ORD-2-1");
    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.append_order_events(order.id(), std::slice::from_ref(&placed))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let locked = tx.order_for_update(order.id()).await.unwrap().unwrap();
    assert_eq!(locked, order);
    let events = order
        .decide_transition(OrderStatus::Cancelled, Utc::now())
        .unwrap();
    order.apply_events(&events);
    tx.update_order(&order).await.unwrap();
    tx.append_order_events(order.id(), &events).await.unwrap();
    tx.commit().await.unwrap();

    let loaded = store
        .order_by_number(&OrderNumber::from("ORD-2-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status(), OrderStatus::Cancelled);
    assert!(loaded.cancelled_at().is_some());

    let history = store.order_events(order.id()).await.unwrap();
    let types: Vec<_> = history.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec!["OrderPlaced", "OrderStatusChanged", "OrderStockReleased"]
    );
    assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));
    let decoded: OrderEvent = history[0].decode().unwrap();
    assert_eq!(decoded, placed);
}

#[tokio::test]
#[serial]
async fn row_lock_serialises_stock_updates() {
    let store = get_test_store().await;
    let p = product(100, 1);
    store.upsert_product(&p).await.unwrap();

    let mut first = store.begin().await.unwrap();
    let locked = first.product_for_update(p.id).await.unwrap().unwrap();
    assert_eq!(locked.stock, 1);

    let second_store = store.clone();
    let id = p.id;
    let second = tokio::spawn(async move {
        let mut tx = second_store.begin().await.unwrap();
        // Blocks until `first` commits, then sees its write.
        let seen = tx.product_for_update(id).await.unwrap().unwrap();
        seen.stock
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    first.write_stock(p.id, 0).await.unwrap();
    first.commit().await.unwrap();

    assert_eq!(second.await.unwrap(), 0);
}
