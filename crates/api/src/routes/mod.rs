//! HTTP handlers.

pub mod carts;
pub mod checkout;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod orders;

use std::fmt::Display;
use std::str::FromStr;

use crate::error::ApiError;

fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
