use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartItemId, OrderId, ProductId, UserId};
use domain::{Cart, CartLine, CartOwner, Money, Order, OrderEvent, OrderNumber, Product};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    RecordedEvent, Result, StoreError,
    store::{Store, StoreTx, encode_events},
};

const PRODUCT_COLUMNS: &str = "id, seller_id, name, sku, image, price, stock, status";

// SQLSTATE codes that mean "retry the whole transaction".
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn map_db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && let Some(code) = db_err.code()
        && (code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED)
    {
        metrics::counter!("store_conflicts_total").increment(1);
        tracing::warn!(code = %code, "transaction conflict");
        return StoreError::Conflict(db_err.message().to_string());
    }
    StoreError::Database(err)
}

fn row_to_product(row: PgRow) -> Result<Product> {
    let stock: i32 = row.try_get("stock")?;
    let status: String = row.try_get("status")?;
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        seller_id: UserId::from_uuid(row.try_get::<Uuid, _>("seller_id")?),
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        image: row.try_get("image")?,
        price: Money::new(row.try_get::<Decimal, _>("price")?),
        stock: u32::try_from(stock)
            .map_err(|_| StoreError::InvalidData(format!("negative stock {stock}")))?,
        status: status.parse().map_err(StoreError::InvalidData)?,
    })
}

fn row_to_cart_line(row: PgRow) -> Result<CartLine> {
    let quantity: i32 = row.try_get("quantity")?;
    Ok(CartLine {
        id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: u32::try_from(quantity)
            .map_err(|_| StoreError::InvalidData(format!("invalid cart quantity {quantity}")))?,
        added_at: row.try_get("added_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let document: serde_json::Value = row.try_get("document")?;
    Ok(serde_json::from_value(document)?)
}

fn row_to_event(row: PgRow) -> Result<RecordedEvent> {
    Ok(RecordedEvent {
        sequence: row.try_get("sequence")?,
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn stock_to_db(stock: u32) -> Result<i32> {
    i32::try_from(stock).map_err(|_| StoreError::InvalidData(format!("stock {stock} out of range")))
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTx { tx })
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_product).transpose()
    }

    async fn products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row_to_product(row).map(|p| (p.id, p)))
            .collect()
    }

    async fn cart(&self, user_id: UserId) -> Result<Cart> {
        let updated_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT updated_at FROM carts WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        let Some(updated_at) = updated_at else {
            return Ok(Cart::new(CartOwner::User(user_id)));
        };

        let rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, added_at
            FROM cart_items
            WHERE user_id = $1
            ORDER BY added_at ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let lines = rows
            .into_iter()
            .map(row_to_cart_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(Cart::restore(CartOwner::User(user_id), lines, updated_at))
    }

    async fn cart_item_owner(&self, item_id: CartItemId) -> Result<Option<UserId>> {
        let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM cart_items WHERE id = $1")
            .bind(item_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner.map(UserId::from_uuid))
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_order).transpose()
    }

    async fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE order_number = $1")
            .bind(number.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_order).transpose()
    }

    async fn orders_for_customer(&self, customer_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT document FROM orders WHERE customer_id = $1 ORDER BY created_at DESC",
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn order_events(&self, order_id: OrderId) -> Result<Vec<RecordedEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, order_id, event_type, payload, recorded_at
            FROM order_events
            WHERE order_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_event).collect()
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, seller_id, name, sku, image, price, stock, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                seller_id = EXCLUDED.seller_id,
                name = EXCLUDED.name,
                sku = EXCLUDED.sku,
                image = EXCLUDED.image,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock,
                status = EXCLUDED.status
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.seller_id.as_uuid())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.image)
        .bind(product.price.amount())
        .bind(stock_to_db(product.stock)?)
        .bind(product.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn remove_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected() > 0)
    }
}

/// Unit of work over a PostgreSQL transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.map(row_to_product).transpose()
    }

    async fn write_stock(&mut self, id: ProductId, stock: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(stock_to_db(stock)?)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", id));
        }
        Ok(())
    }

    async fn cart_for_update(&mut self, user_id: UserId) -> Result<Cart> {
        sqlx::query("INSERT INTO carts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        let updated_at: DateTime<Utc> =
            sqlx::query_scalar("SELECT updated_at FROM carts WHERE user_id = $1 FOR UPDATE")
                .bind(user_id.as_uuid())
                .fetch_one(&mut *self.tx)
                .await
                .map_err(map_db_error)?;

        let rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, added_at
            FROM cart_items
            WHERE user_id = $1
            ORDER BY added_at ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        let lines = rows
            .into_iter()
            .map(row_to_cart_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(Cart::restore(CartOwner::User(user_id), lines, updated_at))
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        let CartOwner::User(user_id) = cart.owner() else {
            return Err(StoreError::InvalidData(format!(
                "only user carts are persisted, got {}",
                cart.owner()
            )));
        };

        sqlx::query(
            r#"
            INSERT INTO carts (user_id, updated_at) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(cart.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        for line in cart.lines() {
            let quantity = i32::try_from(line.quantity).map_err(|_| {
                StoreError::InvalidData(format!("cart quantity {} out of range", line.quantity))
            })?;
            sqlx::query(
                r#"
                INSERT INTO cart_items (id, user_id, product_id, quantity, added_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(user_id.as_uuid())
            .bind(line.product_id.as_uuid())
            .bind(quantity)
            .bind(line.added_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        }
        Ok(())
    }

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_number = $1)")
                .bind(number.as_str())
                .fetch_one(&mut *self.tx)
                .await
                .map_err(map_db_error)?;
        Ok(exists)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let document = serde_json::to_value(order)?;

        // ON CONFLICT keeps the transaction usable so the caller can retry
        // with a fresh number.
        let result = sqlx::query(
            r#"
            INSERT INTO orders
                (id, order_number, customer_id, status, total_amount, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT ON CONSTRAINT unique_order_number DO NOTHING
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number().as_str())
        .bind(order.customer_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_amount().amount())
        .bind(document)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateOrderNumber(
                order.order_number().to_string(),
            ));
        }
        Ok(())
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.map(row_to_order).transpose()
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let document = serde_json::to_value(order)?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, document = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(document)
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Order", order.id()));
        }
        Ok(())
    }

    async fn append_order_events(
        &mut self,
        order_id: OrderId,
        events: &[OrderEvent],
    ) -> Result<()> {
        for (event_type, payload) in encode_events(events)? {
            sqlx::query(
                "INSERT INTO order_events (order_id, event_type, payload) VALUES ($1, $2, $3)",
            )
            .bind(order_id.as_uuid())
            .bind(event_type)
            .bind(payload)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(map_db_error)
    }
}
