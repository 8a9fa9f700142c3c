//! Order lifecycle: status transitions, their side effects and order queries.

use chrono::Utc;
use common::{Actor, OrderId, Role, UserId};
use domain::{Order, OrderEvent, OrderNumber, OrderStatus};
use store::{RecordedEvent, Store, StoreTx};

use crate::config::DEFAULT_MAX_ATTEMPTS;
use crate::error::{MarketplaceError, Result};
use crate::ledger::{InventoryLedger, Release};
use crate::notifications::{NotificationSink, deliver};
use crate::retry::with_retries;

/// Drives orders through the status machine.
///
/// Every change is decided against the order as locked inside the unit of
/// work, so of two concurrent requests the second sees the first's result.
/// Stock release commits together with the status write. Notifications are
/// sent after commit, one per event that owes one.
pub struct OrderLifecycle<S, N> {
    store: S,
    notifier: N,
    max_attempts: u32,
}

impl<S, N> OrderLifecycle<S, N>
where
    S: Store + Clone,
    N: NotificationSink,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Moves an order to `to`.
    ///
    /// Only an admin or a seller with items in the order may do this.
    /// Requesting the current status is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        actor: &Actor,
    ) -> Result<Order> {
        self.change(order_id, "order_transition", |order| {
            authorize_fulfilment(order, actor)?;
            Ok(order.decide_transition(to, Utc::now())?)
        })
        .await
    }

    /// Cancels an order on its customer's behalf.
    ///
    /// The customer who placed the order may cancel it until it ships. Any
    /// other actor goes through [`OrderLifecycle::transition`]'s rules.
    #[tracing::instrument(skip(self))]
    pub async fn request_cancellation(&self, order_id: OrderId, actor: &Actor) -> Result<Order> {
        if actor.role != Role::Customer {
            return self.transition(order_id, OrderStatus::Cancelled, actor).await;
        }

        self.change(order_id, "order_cancellation", |order| {
            if order.customer_id() != actor.user_id {
                return Err(MarketplaceError::Forbidden(
                    "order belongs to another customer".to_string(),
                ));
            }
            let status = order.status();
            if status != OrderStatus::Cancelled && !status.customer_can_cancel() {
                return Err(MarketplaceError::InvalidTransition {
                    from: status,
                    to: OrderStatus::Cancelled,
                });
            }
            Ok(order.decide_transition(OrderStatus::Cancelled, Utc::now())?)
        })
        .await
    }

    /// Attaches or replaces the carrier tracking number.
    #[tracing::instrument(skip(self))]
    pub async fn assign_tracking_number(
        &self,
        order_id: OrderId,
        tracking_number: &str,
        actor: &Actor,
    ) -> Result<Order> {
        self.change(order_id, "order_tracking", |order| {
            authorize_fulfilment(order, actor)?;
            Ok(order.decide_tracking(tracking_number, Utc::now())?)
        })
        .await
    }

    pub async fn order(&self, order_id: OrderId, actor: &Actor) -> Result<Order> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or_else(|| MarketplaceError::not_found("Order", order_id))?;
        authorize_view(&order, actor)?;
        Ok(order)
    }

    pub async fn order_by_number(&self, number: &OrderNumber, actor: &Actor) -> Result<Order> {
        let order = self
            .store
            .order_by_number(number)
            .await?
            .ok_or_else(|| MarketplaceError::not_found("Order", number))?;
        authorize_view(&order, actor)?;
        Ok(order)
    }

    /// A customer's orders, newest first.
    pub async fn orders_for_customer(&self, customer_id: UserId, actor: &Actor) -> Result<Vec<Order>> {
        if !actor.is_admin() && actor.user_id != customer_id {
            return Err(MarketplaceError::Forbidden(
                "cannot list another customer's orders".to_string(),
            ));
        }
        Ok(self.store.orders_for_customer(customer_id).await?)
    }

    /// The order's recorded history, oldest first.
    pub async fn history(&self, order_id: OrderId, actor: &Actor) -> Result<Vec<RecordedEvent>> {
        self.order(order_id, actor).await?;
        Ok(self.store.order_events(order_id).await?)
    }

    async fn change<F>(&self, order_id: OrderId, operation: &'static str, decide: F) -> Result<Order>
    where
        F: Fn(&Order) -> Result<Vec<OrderEvent>> + Send + Sync,
    {
        let (order, events) = with_retries(self.max_attempts, operation, || {
            self.change_in_unit_of_work(order_id, &decide)
        })
        .await?;

        for event in &events {
            if let OrderEvent::StatusChanged(data) = event {
                tracing::info!(%order_id, from = %data.from, to = %data.to, "order status changed");
                metrics::counter!("order_transitions_total", "to" => data.to.as_str()).increment(1);
            }
            if let Some(kind) = event.notification() {
                deliver(&self.notifier, &order, kind).await;
            }
        }
        Ok(order)
    }

    async fn change_in_unit_of_work<F>(
        &self,
        order_id: OrderId,
        decide: &F,
    ) -> Result<(Order, Vec<OrderEvent>)>
    where
        F: Fn(&Order) -> Result<Vec<OrderEvent>> + Send + Sync,
    {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .order_for_update(order_id)
            .await?
            .ok_or_else(|| MarketplaceError::not_found("Order", order_id))?;

        let events = decide(&order)?;
        if events.is_empty() {
            tracing::debug!(%order_id, status = %order.status(), "no change");
            return Ok((order, events));
        }

        // Product rows are locked in id order, as checkout does.
        let mut released: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                OrderEvent::StockReleased(data) => Some(data.lines.iter()),
                _ => None,
            })
            .flatten()
            .collect();
        released.sort_by_key(|line| line.product_id);
        for line in released {
            let outcome =
                InventoryLedger::<S>::release_in(&mut tx, line.product_id, line.quantity).await?;
            if let Release::Restored { stock } = outcome {
                tracing::debug!(product_id = %line.product_id, stock, "stock restored");
            }
        }

        order.apply_events(&events);
        tx.update_order(&order).await?;
        tx.append_order_events(order_id, &events).await?;
        tx.commit().await?;
        Ok((order, events))
    }
}

/// Admins may act on any order; sellers only on orders holding their items.
fn authorize_fulfilment(order: &Order, actor: &Actor) -> Result<()> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Seller if order.involves_seller(actor.user_id) => Ok(()),
        Role::Seller => Err(MarketplaceError::Forbidden(
            "seller has no items in this order".to_string(),
        )),
        Role::Customer => Err(MarketplaceError::Forbidden(
            "customers cannot change order status".to_string(),
        )),
    }
}

fn authorize_view(order: &Order, actor: &Actor) -> Result<()> {
    let allowed = match actor.role {
        Role::Admin => true,
        Role::Seller => order.involves_seller(actor.user_id) || order.customer_id() == actor.user_id,
        Role::Customer => order.customer_id() == actor.user_id,
    };
    if allowed {
        Ok(())
    } else {
        Err(MarketplaceError::Forbidden("order is not visible to this user".to_string()))
    }
}
