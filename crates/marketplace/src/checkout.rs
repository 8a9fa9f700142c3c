//! Checkout: turns a user's cart into an order in one unit of work.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use common::{ProductId, UserId};
use domain::{
    LineProblemKind, NewOrder, NotificationKind, Order, OrderEvent, OrderItem, OrderNumber,
    PaymentMethod, ShippingDetails,
};
use store::{Store, StoreError, StoreTx};

use crate::config::{CheckoutConfig, ORDER_NUMBER_ATTEMPTS};
use crate::error::{MarketplaceError, Result};
use crate::ledger::InventoryLedger;
use crate::notifications::{NotificationSink, deliver};
use crate::retry::with_retries;

/// Places orders from persistent carts.
///
/// Steps run inside a single [`StoreTx`]:
/// 1. lock the cart and its products, re-validate every line
/// 2. reserve stock line by line (ascending product id)
/// 3. snapshot prices and compute totals
/// 4. draw an unused order number
/// 5. insert the order and its `Placed` event
/// 6. empty the cart
///
/// Any failure drops the unit of work and every write with it. The
/// confirmation notification goes out only after commit.
pub struct CheckoutOrchestrator<S, N> {
    store: S,
    notifier: N,
    config: CheckoutConfig,
}

impl<S, N> CheckoutOrchestrator<S, N>
where
    S: Store + Clone,
    N: NotificationSink,
{
    pub fn new(store: S, notifier: N, config: CheckoutConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Places an order for everything in the user's cart.
    #[tracing::instrument(skip(self, shipping, payment_method))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        shipping: ShippingDetails,
        payment_method: PaymentMethod,
    ) -> Result<Order> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();

        let missing = shipping.missing_fields();
        if !missing.is_empty() {
            let err = MarketplaceError::InvalidInput(format!(
                "missing shipping details: {}",
                missing.join(", ")
            ));
            return Err(self.failed(err, started));
        }

        let result = with_retries(self.config.max_attempts, "checkout", || {
            self.place_in_unit_of_work(user_id, &shipping, &payment_method)
        })
        .await;

        let order = match result {
            Ok(order) => order,
            Err(err) => return Err(self.failed(err, started)),
        };

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("checkout_completed").increment(1);
        tracing::info!(
            order_id = %order.id(),
            order_number = %order.order_number(),
            total = %order.total_amount(),
            "order placed"
        );

        deliver(&self.notifier, &order, NotificationKind::Placed).await;
        Ok(order)
    }

    fn failed(&self, err: MarketplaceError, started: Instant) -> MarketplaceError {
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("checkout_failed", "reason" => err.kind()).increment(1);
        match &err {
            MarketplaceError::Infrastructure(_) => tracing::error!(error = %err, "checkout failed"),
            _ => tracing::info!(error = %err, "checkout rejected"),
        }
        err
    }

    async fn place_in_unit_of_work(
        &self,
        user_id: UserId,
        shipping: &ShippingDetails,
        payment_method: &PaymentMethod,
    ) -> Result<Order> {
        let mut tx = self.store.begin().await?;

        let mut cart = tx.cart_for_update(user_id).await?;
        if cart.is_empty() {
            return Err(MarketplaceError::CartEmpty);
        }

        // Stock shortfalls are reported by the reservation below.
        let products = tx.products_for_update(&cart.product_ids()).await?;
        let problems: Vec<_> = cart
            .problems(&products)
            .into_iter()
            .filter(|problem| !matches!(problem.kind, LineProblemKind::InsufficientStock { .. }))
            .collect();
        if !problems.is_empty() {
            return Err(MarketplaceError::CartInvalid { problems });
        }

        let mut quantities: Vec<(ProductId, u32)> = cart
            .lines()
            .iter()
            .map(|line| (line.product_id, line.quantity))
            .collect();
        quantities.sort_by_key(|(product_id, _)| *product_id);

        let mut reserved = HashMap::with_capacity(quantities.len());
        for (product_id, quantity) in quantities {
            let product = InventoryLedger::<S>::reserve_in(&mut tx, product_id, quantity)
                .await
                .map_err(|err| match err {
                    MarketplaceError::Infrastructure(_) => err,
                    other => MarketplaceError::checkout_failed(other),
                })?;
            reserved.insert(product_id, product);
        }

        let mut items = Vec::with_capacity(reserved.len());
        for line in cart.lines() {
            let product = reserved
                .get(&line.product_id)
                .ok_or_else(|| MarketplaceError::not_found("Product", line.product_id))?;
            items.push(OrderItem::snapshot(product, line.quantity));
        }

        let (order, placed) = self
            .insert_with_fresh_number(&mut tx, user_id, items, shipping, payment_method)
            .await?;
        tx.append_order_events(order.id(), std::slice::from_ref(&placed))
            .await?;

        cart.clear();
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Draws order numbers until one is free and the insert succeeds.
    async fn insert_with_fresh_number(
        &self,
        tx: &mut S::Tx,
        customer_id: UserId,
        items: Vec<OrderItem>,
        shipping: &ShippingDetails,
        payment_method: &PaymentMethod,
    ) -> Result<(Order, OrderEvent)> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let order_number = {
                let mut rng = rand::thread_rng();
                OrderNumber::generate(Utc::now(), &mut rng)
            };
            if tx.order_number_exists(&order_number).await? {
                tracing::debug!(%order_number, "order number taken");
                continue;
            }

            let (order, placed) = Order::place(
                NewOrder {
                    order_number,
                    customer_id,
                    items: items.clone(),
                    shipping: shipping.clone(),
                    payment_method: payment_method.clone(),
                },
                &self.config.pricing,
                Utc::now(),
            )?;

            match tx.insert_order(&order).await {
                Ok(()) => return Ok((order, placed)),
                Err(StoreError::DuplicateOrderNumber(number)) => {
                    tracing::debug!(order_number = %number, "order number collided on insert");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(StoreError::Conflict(format!(
            "no free order number after {ORDER_NUMBER_ATTEMPTS} draws"
        ))
        .into())
    }
}
