//! Application configuration loaded from environment variables.

use domain::{Money, PricingError, PricingPolicy};
use marketplace::{CheckoutConfig, DEFAULT_MAX_ATTEMPTS};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: Postgres connection string; in-memory store when unset
/// - `SHIPPING_COST`: flat shipping cost per order (default: `10.00`)
/// - `TAX_RATE`: tax rate on the subtotal (default: `0.10`)
/// - `CHECKOUT_MAX_ATTEMPTS`: attempts per unit of work on conflict (default: `3`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub shipping_cost: Option<String>,
    pub tax_rate: Option<String>,
    pub max_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            shipping_cost: std::env::var("SHIPPING_COST").ok(),
            tax_rate: std::env::var("TAX_RATE").ok(),
            max_attempts: std::env::var("CHECKOUT_MAX_ATTEMPTS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the checkout settings, validating the pricing values.
    pub fn checkout(&self) -> Result<CheckoutConfig, ConfigError> {
        let defaults = PricingPolicy::default();

        let shipping_cost = match &self.shipping_cost {
            Some(raw) => raw.parse::<Money>().map_err(|_| ConfigError::InvalidValue {
                name: "SHIPPING_COST",
                value: raw.clone(),
            })?,
            None => defaults.shipping_cost,
        };
        let tax_rate = match &self.tax_rate {
            Some(raw) => raw.trim().parse::<Decimal>().map_err(|_| ConfigError::InvalidValue {
                name: "TAX_RATE",
                value: raw.clone(),
            })?,
            None => defaults.tax_rate,
        };

        Ok(CheckoutConfig::new(
            PricingPolicy::new(shipping_cost, tax_rate)?,
            self.max_attempts,
        ))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            shipping_cost: None,
            tax_rate: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.checkout().unwrap(), CheckoutConfig::default());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_custom_pricing() {
        let config = Config {
            shipping_cost: Some("4.99".to_string()),
            tax_rate: Some("0.2".to_string()),
            max_attempts: 5,
            ..Config::default()
        };
        let checkout = config.checkout().unwrap();
        assert_eq!(checkout.pricing.shipping_cost, Money::from_cents(499));
        assert_eq!(checkout.pricing.tax_rate, Decimal::new(2, 1));
        assert_eq!(checkout.max_attempts, 5);
    }

    #[test]
    fn test_invalid_pricing_is_rejected() {
        let garbage = Config {
            tax_rate: Some("ten percent".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            garbage.checkout(),
            Err(ConfigError::InvalidValue { name: "TAX_RATE", .. })
        ));

        let negative = Config {
            shipping_cost: Some("-1.00".to_string()),
            ..Config::default()
        };
        assert!(matches!(negative.checkout(), Err(ConfigError::Pricing(_))));
    }
}
