//! Checkout configuration.

use domain::PricingPolicy;

/// Default number of attempts for a unit of work that hits a conflict.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Order numbers drawn per checkout before giving up on finding a free one.
pub const ORDER_NUMBER_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    pub pricing: PricingPolicy,
    /// Total attempts (first try included) when the store reports a conflict.
    pub max_attempts: u32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            pricing: PricingPolicy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl CheckoutConfig {
    pub fn new(pricing: PricingPolicy, max_attempts: u32) -> Self {
        Self {
            pricing,
            max_attempts: max_attempts.max(1),
        }
    }
}
