//! Order totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Money;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("Shipping cost cannot be negative: {0}")]
    NegativeShippingCost(Money),

    #[error("Tax rate must be between 0 and 1, got {0}")]
    TaxRateOutOfRange(Decimal),
}

/// Shipping and tax settings applied at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Flat shipping cost added to every order.
    pub shipping_cost: Money,
    /// Tax rate applied to the subtotal, e.g. `0.10`.
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            shipping_cost: Money::from_cents(1000),
            tax_rate: Decimal::new(10, 2),
        }
    }
}

impl PricingPolicy {
    pub fn new(shipping_cost: Money, tax_rate: Decimal) -> Result<Self, PricingError> {
        if shipping_cost.is_negative() {
            return Err(PricingError::NegativeShippingCost(shipping_cost));
        }
        if tax_rate.is_sign_negative() || tax_rate > Decimal::ONE {
            return Err(PricingError::TaxRateOutOfRange(tax_rate));
        }
        Ok(Self {
            shipping_cost,
            tax_rate,
        })
    }

    /// Computes totals for a subtotal. Only the tax is rounded.
    pub fn quote(&self, subtotal: Money) -> Totals {
        let tax = subtotal.percent_of(self.tax_rate);
        let shipping_cost = self.shipping_cost;
        Totals {
            subtotal,
            shipping_cost,
            tax,
            total: subtotal + shipping_cost + tax,
        }
    }
}

/// Frozen monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,
}
