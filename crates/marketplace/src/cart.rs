//! Cart store: persistent user carts and transient session carts behind one API.

use std::collections::HashMap;
use std::sync::Arc;

use common::{CartItemId, ProductId, SessionId, UserId};
use domain::{Cart, CartLine, CartOwner, CartSummary, LineProblem, Product, validate_quantity};
use store::{Store, StoreTx};
use tokio::sync::{Mutex, RwLock};

use crate::error::{MarketplaceError, Result};
use crate::retry::with_retries;

/// In-process registry of anonymous carts, keyed by session.
///
/// Each cart has its own mutex so different sessions never block each other.
#[derive(Clone, Default)]
pub struct SessionCarts {
    carts: Arc<RwLock<HashMap<SessionId, Arc<Mutex<Cart>>>>>,
}

impl SessionCarts {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_create(&self, session_id: SessionId) -> Arc<Mutex<Cart>> {
        if let Some(cart) = self.carts.read().await.get(&session_id) {
            return Arc::clone(cart);
        }
        let mut carts = self.carts.write().await;
        Arc::clone(
            carts
                .entry(session_id)
                .or_insert_with(|| Arc::new(Mutex::new(Cart::new(CartOwner::Session(session_id))))),
        )
    }

    async fn get(&self, session_id: SessionId) -> Option<Arc<Mutex<Cart>>> {
        self.carts.read().await.get(&session_id).cloned()
    }

    /// Snapshot of a session cart; empty if the session has none.
    pub async fn cart(&self, session_id: SessionId) -> Cart {
        match self.get(session_id).await {
            Some(cart) => cart.lock().await.clone(),
            None => Cart::new(CartOwner::Session(session_id)),
        }
    }

    /// Removes a session cart from the registry and returns its lines.
    ///
    /// A second call for the same session finds nothing, so the lines are
    /// handed out at most once.
    pub async fn take(&self, session_id: SessionId) -> Vec<CartLine> {
        let removed = self.carts.write().await.remove(&session_id);
        match removed {
            Some(cart) => cart.lock().await.take_lines(),
            None => Vec::new(),
        }
    }

    /// Forgets a session cart and whatever it holds.
    pub async fn discard(&self, session_id: SessionId) -> bool {
        self.carts.write().await.remove(&session_id).is_some()
    }

    async fn owner_of(&self, item_id: CartItemId) -> Option<SessionId> {
        let carts: Vec<(SessionId, Arc<Mutex<Cart>>)> = self
            .carts
            .read()
            .await
            .iter()
            .map(|(id, cart)| (*id, Arc::clone(cart)))
            .collect();
        for (session_id, cart) in carts {
            if cart.lock().await.line(item_id).is_some() {
                return Some(session_id);
            }
        }
        None
    }

    pub async fn session_count(&self) -> usize {
        self.carts.read().await.len()
    }
}

/// Cart operations for both owner kinds.
///
/// Adding an item checks that the product exists and is `ACTIVE` but never
/// looks at stock; stock is enforced at checkout only.
#[derive(Clone)]
pub struct CartService<S> {
    store: S,
    sessions: SessionCarts,
    max_attempts: u32,
}

impl<S: Store + Clone> CartService<S> {
    pub fn new(store: S, sessions: SessionCarts) -> Self {
        Self {
            store,
            sessions,
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn sessions(&self) -> &SessionCarts {
        &self.sessions
    }

    /// Adds units of a product, growing an existing line for the same product.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: CartOwner,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartLine> {
        let quantity = validate_quantity(quantity)?;
        let product = self
            .store
            .product(product_id)
            .await?
            .ok_or_else(|| MarketplaceError::not_found("Product", product_id))?;
        if !product.is_active() {
            return Err(MarketplaceError::ProductUnavailable(product_id));
        }

        let line = self
            .mutate(owner, move |cart| {
                let item_id = cart.add(product_id, i64::from(quantity))?;
                cart.line(item_id)
                    .cloned()
                    .ok_or_else(|| MarketplaceError::not_found("Cart item", item_id))
            })
            .await?;

        tracing::info!(%owner, item_id = %line.id, quantity = line.quantity, "cart item added");
        metrics::counter!("cart_items_added_total").increment(1);
        Ok(line)
    }

    /// Sets a line's quantity. Zero or negative fails; use [`CartService::remove_item`].
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        owner: CartOwner,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<()> {
        validate_quantity(quantity)?;
        self.ensure_owns(owner, item_id).await?;
        self.mutate(owner, move |cart| {
            cart.update_quantity(item_id, quantity)?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, owner: CartOwner, item_id: CartItemId) -> Result<()> {
        self.ensure_owns(owner, item_id).await?;
        self.mutate(owner, move |cart| {
            cart.remove(item_id)?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, owner: CartOwner) -> Result<()> {
        self.mutate(owner, |cart| {
            cart.clear();
            Ok(())
        })
        .await
    }

    /// Returns the cart with totals computed from current prices.
    pub async fn view(&self, owner: CartOwner) -> Result<CartSummary> {
        let cart = self.load(owner).await?;
        if cart.is_empty() {
            return Ok(CartSummary::empty());
        }
        let products = self.products_for(&cart).await?;
        Ok(cart.summarize(&products))
    }

    /// Advisory check listing every line that would block checkout.
    pub async fn validate(&self, owner: CartOwner) -> Result<Vec<LineProblem>> {
        let cart = self.load(owner).await?;
        let products = self.products_for(&cart).await?;
        Ok(cart.problems(&products))
    }

    async fn load(&self, owner: CartOwner) -> Result<Cart> {
        match owner {
            CartOwner::User(user_id) => Ok(self.store.cart(user_id).await?),
            CartOwner::Session(session_id) => Ok(self.sessions.cart(session_id).await),
        }
    }

    async fn products_for(&self, cart: &Cart) -> Result<HashMap<ProductId, Product>> {
        Ok(self.store.products(&cart.product_ids()).await?)
    }

    /// Fails with `Unauthorized` if the item sits in someone else's cart and
    /// `NotFound` if it exists nowhere.
    async fn ensure_owns(&self, owner: CartOwner, item_id: CartItemId) -> Result<()> {
        if self.load(owner).await?.line(item_id).is_some() {
            return Ok(());
        }

        let foreign = self.store.cart_item_owner(item_id).await?.is_some()
            || self.sessions.owner_of(item_id).await.is_some();

        if foreign {
            tracing::warn!(%owner, %item_id, "cart item belongs to another owner");
            return Err(MarketplaceError::Unauthorized(format!(
                "cart item {item_id} does not belong to this cart"
            )));
        }
        Err(MarketplaceError::not_found("Cart item", item_id))
    }

    /// Applies a change to the owner's cart, serialised per owner.
    async fn mutate<T, F>(&self, owner: CartOwner, change: F) -> Result<T>
    where
        F: Fn(&mut Cart) -> Result<T> + Send + Sync,
        T: Send,
    {
        match owner {
            CartOwner::User(user_id) => {
                with_retries(self.max_attempts, "cart", || {
                    self.mutate_user_cart(user_id, &change)
                })
                .await
            }
            CartOwner::Session(session_id) => {
                let cart = self.sessions.get_or_create(session_id).await;
                let mut cart = cart.lock().await;
                change(&mut *cart)
            }
        }
    }

    async fn mutate_user_cart<T, F>(&self, user_id: UserId, change: &F) -> Result<T>
    where
        F: Fn(&mut Cart) -> Result<T> + Send + Sync,
    {
        let mut tx = self.store.begin().await?;
        let mut cart = tx.cart_for_update(user_id).await?;
        let value = change(&mut cart)?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(value)
    }
}
