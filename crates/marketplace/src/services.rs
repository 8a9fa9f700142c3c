use store::Store;

use crate::cart::{CartService, SessionCarts};
use crate::checkout::CheckoutOrchestrator;
use crate::config::CheckoutConfig;
use crate::ledger::InventoryLedger;
use crate::lifecycle::OrderLifecycle;
use crate::merge::CartMerger;
use crate::notifications::NotificationSink;

/// Every marketplace component wired to one store and one notification sink.
pub struct Marketplace<S, N> {
    pub ledger: InventoryLedger<S>,
    pub carts: CartService<S>,
    pub merger: CartMerger<S>,
    pub checkout: CheckoutOrchestrator<S, N>,
    pub lifecycle: OrderLifecycle<S, N>,
}

impl<S, N> Marketplace<S, N>
where
    S: Store + Clone,
    N: NotificationSink + Clone,
{
    pub fn new(store: S, notifier: N, config: CheckoutConfig) -> Self {
        let carts = CartService::new(store.clone(), SessionCarts::new())
            .with_max_attempts(config.max_attempts);
        Self {
            ledger: InventoryLedger::new(store.clone()),
            merger: CartMerger::new(carts.clone()),
            carts,
            checkout: CheckoutOrchestrator::new(store.clone(), notifier.clone(), config),
            lifecycle: OrderLifecycle::new(store, notifier).with_max_attempts(config.max_attempts),
        }
    }
}
