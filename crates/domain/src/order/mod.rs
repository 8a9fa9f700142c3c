//! Order aggregate and related types.

mod aggregate;
mod events;
mod status;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use events::{
    Notification, NotificationKind, OrderEvent, OrderPlacedData, ReleasedLine, Severity,
    StatusChangedData, StockReleasedData, TrackingAssignedData,
};
pub use status::{EntryEffect, OrderStatus};
pub use value_objects::{OrderItem, OrderNumber, PaymentMethod, PaymentStatus, ShippingDetails};

use common::ProductId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    #[error("Invalid quantity for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId },

    #[error("Missing shipping details: {}", fields.join(", "))]
    IncompleteShipping { fields: Vec<&'static str> },

    /// The requested edge is not in the transition table.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Tracking number cannot be empty")]
    EmptyTrackingNumber,

    #[error("Cannot assign a tracking number to a {status} order")]
    TrackingNotAllowed { status: OrderStatus },
}
