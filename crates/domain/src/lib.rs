//! Domain model for the marketplace checkout core.
//!
//! Nothing here performs I/O:
//! - `Money` fixed-point amounts and the checkout `PricingPolicy`
//! - `Product` as seen by checkout
//! - `Cart` live product references with derived totals
//! - `Order` frozen snapshots plus the status machine

pub mod cart;
pub mod event;
pub mod money;
pub mod order;
pub mod pricing;
pub mod product;

pub use cart::{
    Cart, CartError, CartLine, CartLineView, CartOwner, CartSummary, LineProblem,
    LineProblemKind, MAX_LINE_QUANTITY, validate_quantity,
};
pub use event::DomainEvent;
pub use money::{MONEY_SCALE, Money};
pub use order::{
    EntryEffect, NewOrder, Notification, NotificationKind, Order, OrderError, OrderEvent,
    OrderItem, OrderNumber, OrderStatus, PaymentMethod, PaymentStatus, ReleasedLine, Severity,
    ShippingDetails,
};
pub use pricing::{PricingError, PricingPolicy, Totals};
pub use product::{Product, ProductStatus};
