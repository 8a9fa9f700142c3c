//! Cart, checkout and order lifecycle services for the marketplace.
//!
//! Components:
//! - `InventoryLedger` is the only writer of product stock
//! - `CartService` serves persistent user carts and transient session carts
//! - `CartMerger` folds a guest cart into the user's cart at sign-in
//! - `CheckoutOrchestrator` places an order in one unit of work
//! - `OrderLifecycle` drives the status machine and its effects
//!
//! Each runs its writes inside a [`store::StoreTx`] and retries the whole
//! unit of work when the store reports a conflict.

pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod merge;
pub mod notifications;
mod retry;
pub mod services;

pub use cart::{CartService, SessionCarts};
pub use checkout::CheckoutOrchestrator;
pub use config::{CheckoutConfig, DEFAULT_MAX_ATTEMPTS};
pub use error::{MarketplaceError, Result};
pub use ledger::{InventoryLedger, Release};
pub use lifecycle::OrderLifecycle;
pub use merge::{CartMerger, LineOutcome, MergeReport, MergedLine};
pub use notifications::{
    NotificationError, NotificationSink, RecordingNotificationSink, TracingNotificationSink,
};
pub use services::Marketplace;
