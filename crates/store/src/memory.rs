use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartItemId, OrderId, ProductId, UserId};
use domain::{Cart, CartOwner, Order, OrderEvent, OrderNumber, Product};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    RecordedEvent, Result, StoreError,
    store::{Store, StoreTx, encode_events},
};

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
    order_numbers: HashMap<OrderNumber, OrderId>,
    events: Vec<RecordedEvent>,
}

/// A lockable row. Units of work acquire rows in this order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum RowKey {
    Order(OrderId),
    Cart(UserId),
    Product(ProductId),
    OrderNumber(OrderNumber),
}

/// Registry of row mutexes. Entries exist only while someone holds or
/// waits on the row.
#[derive(Clone, Default)]
struct RowLocks {
    rows: Arc<StdMutex<HashMap<RowKey, Arc<Mutex<()>>>>>,
}

impl RowLocks {
    fn row(&self, key: &RowKey) -> Arc<Mutex<()>> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(rows.entry(key.clone()).or_default())
    }

    fn prune(&self, key: &RowKey) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        if rows.get(key).is_some_and(|row| Arc::strong_count(row) == 1) {
            rows.remove(key);
        }
    }

    async fn lock(&self, key: RowKey) -> RowGuard {
        let guard = self.row(&key).lock_owned().await;
        RowGuard {
            key,
            guard: Some(guard),
            locks: self.clone(),
        }
    }

    fn try_lock(&self, key: RowKey) -> Option<RowGuard> {
        match self.row(&key).try_lock_owned() {
            Ok(guard) => Some(RowGuard {
                key,
                guard: Some(guard),
                locks: self.clone(),
            }),
            Err(_) => {
                self.prune(&key);
                None
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds a row until dropped.
struct RowGuard {
    key: RowKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: RowLocks,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.prune(&self.key);
    }
}

/// In-memory store for tests and single-process deployments.
///
/// Units of work lock the rows they touch, the way the Postgres backend
/// does with `SELECT .. FOR UPDATE`, and buffer their writes until
/// `commit` applies them all at once. Units of work on different rows run
/// side by side. Reads go to the committed state and never wait on an open
/// unit of work.
///
/// Rows are taken in [`RowKey`] order. A unit of work asking for a row that
/// sorts before one it already holds does not wait: if the row is busy it
/// fails with [`StoreError::Conflict`] so the caller starts over.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    committed: Arc<RwLock<State>>,
    locks: RowLocks,
    injected_conflicts: Arc<AtomicU32>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with [`StoreError::Conflict`].
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.committed.read().await.orders.len()
    }

    /// Returns the total number of order events stored.
    pub async fn event_count(&self) -> usize {
        self.committed.read().await.events.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        Ok(InMemoryTx {
            committed: Arc::clone(&self.committed),
            locks: self.locks.clone(),
            injected_conflicts: Arc::clone(&self.injected_conflicts),
            held: BTreeMap::new(),
            writes: Writes::default(),
        })
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.committed.read().await.products.get(&id).cloned())
    }

    async fn products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let state = self.committed.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self
            .committed
            .read()
            .await
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Cart::new(CartOwner::User(user_id))))
    }

    async fn cart_item_owner(&self, item_id: CartItemId) -> Result<Option<UserId>> {
        let state = self.committed.read().await;
        Ok(state
            .carts
            .iter()
            .find(|(_, cart)| cart.line(item_id).is_some())
            .map(|(user_id, _)| *user_id))
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.committed.read().await.orders.get(&id).cloned())
    }

    async fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let state = self.committed.read().await;
        Ok(state
            .order_numbers
            .get(number)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn orders_for_customer(&self, customer_id: UserId) -> Result<Vec<Order>> {
        let state = self.committed.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.customer_id() == customer_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at()));
        Ok(orders)
    }

    async fn order_events(&self, order_id: OrderId) -> Result<Vec<RecordedEvent>> {
        let state = self.committed.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        let _row = self.locks.lock(RowKey::Product(product.id)).await;
        self.committed
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn remove_product(&self, id: ProductId) -> Result<bool> {
        let _row = self.locks.lock(RowKey::Product(id)).await;
        Ok(self.committed.write().await.products.remove(&id).is_some())
    }
}

struct PendingEvent {
    order_id: OrderId,
    event_type: &'static str,
    payload: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

/// Rows written by a unit of work, applied on commit.
#[derive(Default)]
struct Writes {
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
    order_numbers: HashMap<OrderNumber, OrderId>,
    events: Vec<PendingEvent>,
}

/// Unit of work over [`InMemoryStore`].
pub struct InMemoryTx {
    committed: Arc<RwLock<State>>,
    locks: RowLocks,
    injected_conflicts: Arc<AtomicU32>,
    held: BTreeMap<RowKey, RowGuard>,
    writes: Writes,
}

impl InMemoryTx {
    async fn lock(&mut self, key: RowKey) -> Result<()> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let in_order = self.held.last_key_value().is_none_or(|(last, _)| *last < key);
        let row = if in_order {
            self.locks.lock(key.clone()).await
        } else {
            self.locks.try_lock(key.clone()).ok_or_else(|| {
                metrics::counter!("store_conflicts_total").increment(1);
                tracing::warn!(row = ?key, "row taken out of order is busy");
                StoreError::Conflict(format!("{key:?} is locked by another unit of work"))
            })?
        };
        self.held.insert(key, row);
        Ok(())
    }

    async fn current_product(&self, id: ProductId) -> Option<Product> {
        match self.writes.products.get(&id) {
            Some(product) => Some(product.clone()),
            None => self.committed.read().await.products.get(&id).cloned(),
        }
    }

    async fn current_order(&self, id: OrderId) -> Option<Order> {
        match self.writes.orders.get(&id) {
            Some(order) => Some(order.clone()),
            None => self.committed.read().await.orders.get(&id).cloned(),
        }
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>> {
        self.lock(RowKey::Product(id)).await?;
        Ok(self.current_product(id).await)
    }

    async fn write_stock(&mut self, id: ProductId, stock: u32) -> Result<()> {
        self.lock(RowKey::Product(id)).await?;
        let mut product = self
            .current_product(id)
            .await
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        product.stock = stock;
        self.writes.products.insert(id, product);
        Ok(())
    }

    async fn cart_for_update(&mut self, user_id: UserId) -> Result<Cart> {
        self.lock(RowKey::Cart(user_id)).await?;
        if let Some(cart) = self.writes.carts.get(&user_id) {
            return Ok(cart.clone());
        }
        Ok(self
            .committed
            .read()
            .await
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Cart::new(CartOwner::User(user_id))))
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        let CartOwner::User(user_id) = cart.owner() else {
            return Err(StoreError::InvalidData(format!(
                "only user carts are persisted, got {}",
                cart.owner()
            )));
        };
        self.lock(RowKey::Cart(user_id)).await?;
        self.writes.carts.insert(user_id, cart.clone());
        Ok(())
    }

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool> {
        Ok(self.writes.order_numbers.contains_key(number)
            || self.committed.read().await.order_numbers.contains_key(number))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let number = order.order_number().clone();
        let duplicate = || StoreError::DuplicateOrderNumber(number.to_string());

        // A number held by another open unit of work is as taken as a committed one.
        let number_key = RowKey::OrderNumber(number.clone());
        if !self.held.contains_key(&number_key) {
            let row = self.locks.try_lock(number_key.clone()).ok_or_else(duplicate)?;
            self.held.insert(number_key, row);
        }
        if self.order_number_exists(&number).await? {
            return Err(duplicate());
        }

        let order_key = RowKey::Order(order.id());
        let row = self
            .locks
            .try_lock(order_key.clone())
            .ok_or_else(|| StoreError::Conflict(format!("order {} is locked", order.id())))?;
        self.held.insert(order_key, row);

        self.writes.order_numbers.insert(number, order.id());
        self.writes.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.lock(RowKey::Order(id)).await?;
        Ok(self.current_order(id).await)
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        self.lock(RowKey::Order(order.id())).await?;
        if self.current_order(order.id()).await.is_none() {
            return Err(StoreError::not_found("Order", order.id()));
        }
        self.writes.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn append_order_events(
        &mut self,
        order_id: OrderId,
        events: &[OrderEvent],
    ) -> Result<()> {
        let recorded_at = Utc::now();
        for (event_type, payload) in encode_events(events)? {
            self.writes.events.push(PendingEvent {
                order_id,
                event_type,
                payload,
                recorded_at,
            });
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let injected = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            metrics::counter!("store_conflicts_total").increment(1);
            return Err(StoreError::Conflict("injected conflict".to_string()));
        }

        let writes = self.writes;
        let mut state = self.committed.write().await;
        state.products.extend(writes.products);
        state.carts.extend(writes.carts);
        state.orders.extend(writes.orders);
        state.order_numbers.extend(writes.order_numbers);

        let mut sequence = state.events.last().map_or(0, |e| e.sequence);
        for event in writes.events {
            sequence += 1;
            state.events.push(RecordedEvent {
                sequence,
                order_id: event.order_id,
                event_type: event.event_type.to_string(),
                payload: event.payload,
                recorded_at: event.recorded_at,
            });
        }
        Ok(())
    }
}
