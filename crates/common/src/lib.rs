//! Shared identifiers and the acting identity used across the marketplace crates.

mod actor;
mod ids;

pub use actor::{Actor, Role};
pub use ids::{CartItemId, OrderId, ProductId, SessionId, UserId};
