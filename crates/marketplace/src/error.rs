//! Marketplace error types.

use common::ProductId;
use domain::{CartError, LineProblem, LineProblemKind, OrderError, OrderStatus};
use store::StoreError;
use thiserror::Error;

/// Errors returned by the marketplace services.
///
/// Every business-rule violation is a typed variant; only
/// [`MarketplaceError::Infrastructure`] signals a fault the caller cannot fix.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// Entity absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The acting owner does not own the cart item.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The actor's role or relationship to the order does not allow this.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid quantity: {quantity} (must be between 1 and {max})", max = domain::MAX_LINE_QUANTITY)]
    InvalidQuantity { quantity: i64 },

    #[error("Cart is empty")]
    CartEmpty,

    /// One or more lines cannot be checked out.
    #[error("Cart has {} invalid line(s)", problems.len())]
    CartInvalid { problems: Vec<LineProblem> },

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, only {available} left"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Product {0} is not available for purchase")]
    ProductUnavailable(ProductId),

    /// Illegal state-machine edge.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A step of the checkout unit of work failed and every write was unwound.
    #[error("Checkout failed: {reason}")]
    CheckoutFailed { reason: Box<MarketplaceError> },

    /// Malformed input such as blank shipping fields.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persistence is unavailable or returned unusable data.
    #[error("Infrastructure failure: {0}")]
    Infrastructure(#[from] StoreError),
}

impl MarketplaceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        MarketplaceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn checkout_failed(reason: MarketplaceError) -> Self {
        MarketplaceError::CheckoutFailed {
            reason: Box::new(reason),
        }
    }

    /// Returns true if a stock shortfall caused this error, however it surfaced.
    pub fn is_insufficient_stock(&self) -> bool {
        match self {
            MarketplaceError::InsufficientStock { .. } => true,
            MarketplaceError::CheckoutFailed { reason } => reason.is_insufficient_stock(),
            MarketplaceError::CartInvalid { problems } => problems
                .iter()
                .any(|p| matches!(p.kind, LineProblemKind::InsufficientStock { .. })),
            _ => false,
        }
    }

    /// Returns true if the unit of work can be retried from the start.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MarketplaceError::Infrastructure(e) if e.is_retryable())
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketplaceError::NotFound { .. } => "not_found",
            MarketplaceError::Unauthorized(_) => "unauthorized",
            MarketplaceError::Forbidden(_) => "forbidden",
            MarketplaceError::InvalidQuantity { .. } => "invalid_quantity",
            MarketplaceError::CartEmpty => "cart_empty",
            MarketplaceError::CartInvalid { .. } => "cart_invalid",
            MarketplaceError::InsufficientStock { .. } => "insufficient_stock",
            MarketplaceError::ProductUnavailable(_) => "product_unavailable",
            MarketplaceError::InvalidTransition { .. } => "invalid_transition",
            MarketplaceError::CheckoutFailed { .. } => "checkout_failed",
            MarketplaceError::InvalidInput(_) => "invalid_input",
            MarketplaceError::Infrastructure(_) => "infrastructure",
        }
    }
}

impl From<CartError> for MarketplaceError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::InvalidQuantity { quantity } => {
                MarketplaceError::InvalidQuantity { quantity }
            }
            CartError::ItemNotFound(id) => MarketplaceError::not_found("Cart item", id),
        }
    }
}

impl From<OrderError> for MarketplaceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => {
                MarketplaceError::InvalidTransition { from, to }
            }
            other => MarketplaceError::InvalidInput(other.to_string()),
        }
    }
}

/// Convenience type alias for marketplace results.
pub type Result<T> = std::result::Result<T, MarketplaceError>;
