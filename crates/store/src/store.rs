use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartItemId, OrderId, ProductId, UserId};
use domain::{Cart, DomainEvent, Order, OrderEvent, OrderNumber, Product};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

/// An order event as persisted in the append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Global, strictly increasing position in the history.
    pub sequence: i64,
    pub order_id: OrderId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl RecordedEvent {
    /// Deserializes the payload into a typed event.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Encodes order events for [`StoreTx::append_order_events`] implementations.
pub(crate) fn encode_events(events: &[OrderEvent]) -> Result<Vec<(&'static str, serde_json::Value)>> {
    events
        .iter()
        .map(|event| Ok((event.event_type(), serde_json::to_value(event)?)))
        .collect()
}

/// Entry point to persistence.
///
/// Every write goes through a unit of work opened with [`Store::begin`]. The
/// read methods here never take locks and only see committed data.
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: StoreTx;

    /// Opens a unit of work. Dropping it without calling
    /// [`StoreTx::commit`] discards all of its writes.
    async fn begin(&self) -> Result<Self::Tx>;

    async fn product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Returns the products that exist among `ids`.
    async fn products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;

    /// Returns the user's cart, or an empty one if none was created yet.
    async fn cart(&self, user_id: UserId) -> Result<Cart>;

    /// Returns the user whose cart holds the item, if any.
    async fn cart_item_owner(&self, item_id: CartItemId) -> Result<Option<UserId>>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>>;

    /// Orders placed by a customer, newest first.
    async fn orders_for_customer(&self, customer_id: UserId) -> Result<Vec<Order>>;

    /// History of an order, oldest first.
    async fn order_events(&self, order_id: OrderId) -> Result<Vec<RecordedEvent>>;

    /// Catalog write path: creates or replaces a product.
    async fn upsert_product(&self, product: &Product) -> Result<()>;

    /// Catalog write path: deletes a product. Returns false if it did not exist.
    async fn remove_product(&self, id: ProductId) -> Result<bool>;
}

/// A unit of work.
///
/// The `*_for_update` reads lock what they return until the unit of work
/// ends, so a read-modify-write inside one `StoreTx` is never interleaved
/// with another unit of work touching the same rows.
#[async_trait]
pub trait StoreTx: Send {
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Locks several products in ascending id order.
    async fn products_for_update(
        &mut self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>> {
        let mut sorted = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut products = HashMap::with_capacity(sorted.len());
        for id in sorted {
            if let Some(product) = self.product_for_update(id).await? {
                products.insert(id, product);
            }
        }
        Ok(products)
    }

    /// Overwrites a product's stock counter.
    async fn write_stock(&mut self, id: ProductId, stock: u32) -> Result<()>;

    /// Locks and returns the user's cart, creating an empty one on first use.
    async fn cart_for_update(&mut self, user_id: UserId) -> Result<Cart>;

    /// Replaces the stored lines of a user cart.
    async fn save_cart(&mut self, cart: &Cart) -> Result<()>;

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool>;

    /// Inserts a new order. Fails with `DuplicateOrderNumber` on collision
    /// and leaves the unit of work usable.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Persists the mutable part of an order (status, tracking, timestamps).
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    async fn append_order_events(&mut self, order_id: OrderId, events: &[OrderEvent])
    -> Result<()>;

    async fn commit(self) -> Result<()>;
}
