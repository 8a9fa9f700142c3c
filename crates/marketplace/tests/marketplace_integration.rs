//! End-to-end tests for carts, checkout and the order lifecycle on the in-memory store.

use std::sync::Arc;

use common::{Actor, ProductId, SessionId, UserId};
use domain::{
    CartOwner, Money, NotificationKind, OrderStatus, PaymentMethod, Product, ProductStatus,
    ShippingDetails,
};
use futures_util::future::join_all;
use marketplace::{
    CheckoutConfig, LineOutcome, Marketplace, MarketplaceError, RecordingNotificationSink,
};
use store::{InMemoryStore, Store};

type TestMarketplace = Marketplace<InMemoryStore, RecordingNotificationSink>;

struct TestHarness {
    market: Arc<TestMarketplace>,
    store: InMemoryStore,
    sink: RecordingNotificationSink,
    seller: UserId,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(CheckoutConfig::default())
    }

    fn with_config(config: CheckoutConfig) -> Self {
        let store = InMemoryStore::new();
        let sink = RecordingNotificationSink::new();
        let market = Arc::new(Marketplace::new(store.clone(), sink.clone(), config));
        Self {
            market,
            store,
            sink,
            seller: UserId::new(),
        }
    }

    async fn product(&self, name: &str, cents: i64, stock: u32) -> Product {
        let product = Product::new(self.seller, name, format!("SKU-{name}"), Money::from_cents(cents), stock);
        self.store.upsert_product(&product).await.unwrap();
        product
    }

    async fn stock(&self, id: ProductId) -> u32 {
        self.store.product(id).await.unwrap().unwrap().stock
    }

    async fn add(&self, user: UserId, product: &Product, quantity: i64) {
        self.market
            .carts
            .add_item(CartOwner::User(user), product.id, quantity)
            .await
            .unwrap();
    }

    async fn checkout(&self, user: UserId) -> marketplace::Result<domain::Order> {
        self.market
            .checkout
            .place_order(user, shipping(), PaymentMethod::default())
            .await
    }
}

fn shipping() -> ShippingDetails {
    ShippingDetails {
        name: "Ada Lovelace".into(),
        email: "ada@example.com".into(),
        phone: "555-0199".into(),
        address: "12 Analytical Way".into(),
        city: "London".into(),
        state: "LDN".into(),
        zip_code: "10001".into(),
        country: "USA".into(),
        notes: Some("leave at the door".into()),
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn test_totals_stock_and_cart_after_checkout() {
        let h = TestHarness::new();
        let a = h.product("A", 1000, 2).await;
        let b = h.product("B", 500, 1).await;
        let user = UserId::new();
        h.add(user, &a, 2).await;
        h.add(user, &b, 1).await;

        let order = h.checkout(user).await.unwrap();

        assert_eq!(order.subtotal(), Money::from_cents(2500));
        assert_eq!(order.shipping_cost(), Money::from_cents(1000));
        assert_eq!(order.tax(), Money::from_cents(250));
        assert_eq!(order.total_amount(), Money::from_cents(3750));
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.shipping().notes.as_deref(), Some("leave at the door"));
        assert_eq!(order.payment_method().as_str(), "COD");

        assert_eq!(h.stock(a.id).await, 0);
        assert_eq!(h.stock(b.id).await, 0);

        let cart = h.market.carts.view(CartOwner::User(user)).await.unwrap();
        assert_eq!(cart.count, 0);
        assert!(cart.items.is_empty());

        let stored = h.store.order_by_number(order.order_number()).await.unwrap();
        assert_eq!(stored.as_ref(), Some(&order));
    }

    #[tokio::test]
    async fn test_empty_cart_touches_nothing() {
        let h = TestHarness::new();
        let p = h.product("A", 1000, 4).await;

        let err = h.checkout(UserId::new()).await.unwrap_err();

        assert!(matches!(err, MarketplaceError::CartEmpty));
        assert_eq!(h.stock(p.id).await, 4);
        assert_eq!(h.store.order_count().await, 0);
        assert_eq!(h.sink.attempt_count().await, 0);
    }

    #[tokio::test]
    async fn test_deleted_product_makes_cart_invalid() {
        let h = TestHarness::new();
        let keep = h.product("A", 1000, 4).await;
        let gone = h.product("B", 1000, 4).await;
        let user = UserId::new();
        h.add(user, &keep, 1).await;
        h.add(user, &gone, 1).await;
        h.store.remove_product(gone.id).await.unwrap();

        let problems = h.market.carts.validate(CartOwner::User(user)).await.unwrap();
        assert_eq!(problems.len(), 1);

        let err = h.checkout(user).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::CartInvalid { ref problems } if problems.len() == 1));
        assert_eq!(h.stock(keep.id).await, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_unit_goes_to_exactly_one_buyer() {
        let h = TestHarness::new();
        let p = h.product("Last", 4200, 1).await;
        let buyers = [UserId::new(), UserId::new()];
        for buyer in buyers {
            h.add(buyer, &p, 1).await;
        }

        let attempts = buyers.map(|buyer| {
            let market = Arc::clone(&h.market);
            tokio::spawn(async move {
                market
                    .checkout
                    .place_order(buyer, shipping(), PaymentMethod::default())
                    .await
            })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let placed = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_insufficient_stock()))
            .count();
        assert_eq!(placed, 1);
        assert_eq!(short, 1);
        assert_eq!(h.stock(p.id).await, 0);
        assert_eq!(h.store.order_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_never_oversell() {
        let h = TestHarness::new();
        let p = h.product("Popular", 100, 5).await;
        let buyers: Vec<UserId> = (0..12).map(|_| UserId::new()).collect();
        for buyer in &buyers {
            h.add(*buyer, &p, 1).await;
        }

        let attempts = buyers.iter().map(|buyer| {
            let market = Arc::clone(&h.market);
            let buyer = *buyer;
            tokio::spawn(async move {
                market
                    .checkout
                    .place_order(buyer, shipping(), PaymentMethod::default())
                    .await
                    .is_ok()
            })
        });
        let placed = join_all(attempts)
            .await
            .into_iter()
            .filter(|joined| *joined.as_ref().unwrap())
            .count();

        assert_eq!(placed, 5);
        assert_eq!(h.stock(p.id).await, 0);
    }

    #[tokio::test]
    async fn test_snapshot_survives_catalog_edits() {
        let h = TestHarness::new();
        let p = h.product("Soap", 350, 10).await;
        let user = UserId::new();
        h.add(user, &p, 2).await;
        let order = h.checkout(user).await.unwrap();

        let mut edited = h.store.product(p.id).await.unwrap().unwrap();
        edited.price = Money::from_cents(9900);
        edited.name = "Luxury Soap".into();
        h.store.upsert_product(&edited).await.unwrap();

        let stored = h.store.order(order.id()).await.unwrap().unwrap();
        let item = &stored.items()[0];
        assert_eq!(item.unit_price, Money::from_cents(350));
        assert_eq!(item.line_total, Money::from_cents(700));
        assert_eq!(item.product_name, "Soap");
        assert_eq!(stored.subtotal(), Money::from_cents(700));
    }

    #[tokio::test]
    async fn test_cart_prices_are_live() {
        let h = TestHarness::new();
        let p = h.product("Soap", 350, 10).await;
        let owner = CartOwner::User(UserId::new());
        h.market.carts.add_item(owner, p.id, 2).await.unwrap();

        let mut edited = p.clone();
        edited.price = Money::from_cents(400);
        h.store.upsert_product(&edited).await.unwrap();

        let view = h.market.carts.view(owner).await.unwrap();
        assert_eq!(view.total, Money::from_cents(800));
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_order() {
        let h = TestHarness::new();
        h.sink.set_fail_on_notify(true).await;
        let p = h.product("A", 1000, 3).await;
        let user = UserId::new();
        h.add(user, &p, 1).await;

        let order = h.checkout(user).await.unwrap();

        assert!(h.store.order(order.id()).await.unwrap().is_some());
        assert_eq!(h.stock(p.id).await, 2);
        assert_eq!(h.sink.attempt_count().await, 1);
        assert!(h.sink.delivered().await.is_empty());
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let h = TestHarness::new();
        let p = h.product("A", 1000, 3).await;
        let user = UserId::new();
        h.add(user, &p, 2).await;

        h.store.inject_conflicts(2);
        let order = h.checkout(user).await.unwrap();

        assert_eq!(order.total_quantity(), 2);
        assert_eq!(h.stock(p.id).await, 1);
        assert_eq!(h.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_conflicts_beyond_budget_surface_as_infrastructure() {
        let h = TestHarness::with_config(CheckoutConfig::new(Default::default(), 2));
        let p = h.product("A", 1000, 3).await;
        let user = UserId::new();
        h.add(user, &p, 2).await;

        h.store.inject_conflicts(2);
        let err = h.checkout(user).await.unwrap_err();

        assert!(matches!(err, MarketplaceError::Infrastructure(_)));
        assert_eq!(h.stock(p.id).await, 3);
        assert_eq!(h.store.order_count().await, 0);
        assert_eq!(h.store.cart(user).await.unwrap().total_quantity(), 2);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_cancel_restores_stock_exactly_once() {
        let h = TestHarness::new();
        let p = h.product("A", 1000, 5).await;
        let user = UserId::new();
        h.add(user, &p, 3).await;
        let order = h.checkout(user).await.unwrap();
        assert_eq!(h.stock(p.id).await, 2);

        let customer = Actor::customer(user);
        for _ in 0..3 {
            let cancelled = h
                .market
                .lifecycle
                .request_cancellation(order.id(), &customer)
                .await
                .unwrap();
            assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        }

        assert_eq!(h.stock(p.id).await, 5);
        assert_eq!(
            h.sink.delivered_kinds().await,
            vec![NotificationKind::Placed, NotificationKind::Cancelled]
        );
    }

    #[tokio::test]
    async fn test_illegal_edge_leaves_status() {
        let h = TestHarness::new();
        let p = h.product("A", 1000, 5).await;
        let user = UserId::new();
        h.add(user, &p, 1).await;
        let order = h.checkout(user).await.unwrap();
        let seller = Actor::seller(h.seller);

        for to in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            h.market.lifecycle.transition(order.id(), to, &seller).await.unwrap();
        }

        let err = h
            .market
            .lifecycle
            .transition(order.id(), OrderStatus::Processing, &seller)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::InvalidTransition { .. }));
        assert!(matches!(
            h.market
                .lifecycle
                .transition(order.id(), OrderStatus::Cancelled, &seller)
                .await,
            Err(MarketplaceError::InvalidTransition { .. })
        ));

        let refunded = h
            .market
            .lifecycle
            .transition(order.id(), OrderStatus::Refunded, &seller)
            .await
            .unwrap();
        assert_eq!(refunded.status(), OrderStatus::Refunded);
        assert_eq!(h.stock(p.id).await, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_ship_and_cancel_resolve_against_latest_status() {
        let h = TestHarness::new();
        let p = h.product("A", 1000, 5).await;
        let user = UserId::new();
        h.add(user, &p, 2).await;
        let order = h.checkout(user).await.unwrap();
        let admin = Actor::admin(UserId::new());
        let seller = Actor::seller(h.seller);
        for to in [OrderStatus::Confirmed, OrderStatus::Processing] {
            h.market.lifecycle.transition(order.id(), to, &admin).await.unwrap();
        }

        let order_id = order.id();

        let ship = {
            let market = Arc::clone(&h.market);
            tokio::spawn(async move {
                market
                    .lifecycle
                    .transition(order_id, OrderStatus::Shipped, &seller)
                    .await
            })
        };
        let cancel = {
            let market = Arc::clone(&h.market);
            tokio::spawn(async move {
                market
                    .lifecycle
                    .transition(order_id, OrderStatus::Cancelled, &admin)
                    .await
            })
        };
        let ship = ship.await.unwrap();
        let cancel = cancel.await.unwrap();

        assert!(cancel.is_ok());
        let final_order = h.store.order(order.id()).await.unwrap().unwrap();
        assert_eq!(final_order.status(), OrderStatus::Cancelled);
        match ship {
            Ok(_) => assert!(final_order.shipped_at().is_some()),
            Err(err) => assert!(matches!(err, MarketplaceError::InvalidTransition { .. })),
        }
        assert_eq!(h.stock(p.id).await, 5);
    }

    #[tokio::test]
    async fn test_history_records_every_change() {
        let h = TestHarness::new();
        let p = h.product("A", 1000, 5).await;
        let user = UserId::new();
        h.add(user, &p, 1).await;
        let order = h.checkout(user).await.unwrap();
        let seller = Actor::seller(h.seller);

        h.market
            .lifecycle
            .transition(order.id(), OrderStatus::Confirmed, &seller)
            .await
            .unwrap();
        h.market
            .lifecycle
            .assign_tracking_number(order.id(), "TRK-42", &seller)
            .await
            .unwrap();
        h.market
            .lifecycle
            .transition(order.id(), OrderStatus::Cancelled, &seller)
            .await
            .unwrap();

        let history = h
            .market
            .lifecycle
            .history(order.id(), &Actor::customer(user))
            .await
            .unwrap();
        let types: Vec<_> = history.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "OrderPlaced",
                "OrderStatusChanged",
                "OrderTrackingAssigned",
                "OrderStatusChanged",
                "OrderStockReleased",
            ]
        );
        assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }
}

mod guest_carts {
    use super::*;

    #[tokio::test]
    async fn test_merge_drops_deleted_product_and_empties_guest_cart() {
        let h = TestHarness::new();
        let a = h.product("A", 100, 5).await;
        let b = h.product("B", 200, 5).await;
        let c = h.product("C", 300, 5).await;
        let session = SessionId::new();
        let guest = CartOwner::Session(session);
        for p in [&a, &b, &c] {
            h.market.carts.add_item(guest, p.id, 1).await.unwrap();
        }
        h.store.remove_product(b.id).await.unwrap();

        let user = UserId::new();
        let report = h.market.merger.merge(session, user).await.unwrap();

        assert_eq!(report.merged_count(), 2);
        let dropped: Vec<_> = report
            .lines
            .iter()
            .filter(|line| matches!(line.outcome, LineOutcome::Dropped { .. }))
            .map(|line| line.product_id)
            .collect();
        assert_eq!(dropped, vec![b.id]);

        let cart = h.market.carts.view(CartOwner::User(user)).await.unwrap();
        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.total, Money::from_cents(400));
        assert_eq!(h.market.carts.view(guest).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_guest_can_check_out_after_merge() {
        let h = TestHarness::new();
        let p = h.product("A", 1000, 5).await;
        let session = SessionId::new();
        h.market
            .carts
            .add_item(CartOwner::Session(session), p.id, 2)
            .await
            .unwrap();

        let user = UserId::new();
        h.market.merger.merge(session, user).await.unwrap();
        let order = h.checkout(user).await.unwrap();

        assert_eq!(order.total_quantity(), 2);
        assert_eq!(h.stock(p.id).await, 3);
    }

    #[tokio::test]
    async fn test_deactivated_product_cannot_be_added() {
        let h = TestHarness::new();
        let p = h.product("A", 1000, 5).await;
        h.store
            .upsert_product(&p.clone().with_status(ProductStatus::Inactive))
            .await
            .unwrap();

        let err = h
            .market
            .carts
            .add_item(CartOwner::Session(SessionId::new()), p.id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::ProductUnavailable(id) if id == p.id));
    }
}
