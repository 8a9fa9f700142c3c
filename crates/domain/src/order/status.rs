//! Order status machine.

use serde::{Deserialize, Serialize};

/// The status of an order after checkout.
///
/// Legal transitions:
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered ──► Refunded
///    │            │             │             │
///    └────────────┴─────────────┴─────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Placed, awaiting seller confirmation.
    #[default]
    Pending,

    Confirmed,

    Processing,

    Shipped,

    /// Received by the customer. Only a refund may follow.
    Delivered,

    /// Cancelled before delivery (terminal state).
    Cancelled,

    /// Refunded after delivery (terminal state).
    Refunded,
}

/// Side effect triggered by entering a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryEffect {
    /// Return every ordered unit to inventory.
    ReleaseStock,
    /// Stamp the status' milestone timestamp, once.
    RecordTimestamp,
    /// Tell the customer about the new status.
    NotifyCustomer,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// The single forward step on the happy path, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::Processing),
            OrderStatus::Processing => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => Some(OrderStatus::Refunded),
            OrderStatus::Cancelled | OrderStatus::Refunded => None,
        }
    }

    /// Returns true if `to` is a legal edge from this status.
    ///
    /// A status never transitions to itself; same-status requests are
    /// handled as no-ops by the caller.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        if to == OrderStatus::Cancelled {
            return self.can_cancel();
        }
        self.next() == Some(to)
    }

    /// Returns true if the order can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the customer may cancel the order themselves.
    pub fn customer_can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing
        )
    }

    /// Returns true for `Delivered`, `Cancelled` and `Refunded`.
    ///
    /// `Delivered` still admits the refund edge; see [`OrderStatus::can_transition_to`].
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Returns true if a tracking number may be attached in this status.
    pub fn accepts_tracking(&self) -> bool {
        !matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Effects fired when an order enters this status.
    pub fn entry_effects(&self) -> &'static [EntryEffect] {
        use EntryEffect::*;
        match self {
            OrderStatus::Pending => &[],
            OrderStatus::Confirmed | OrderStatus::Processing | OrderStatus::Refunded => {
                &[NotifyCustomer]
            }
            OrderStatus::Shipped | OrderStatus::Delivered => &[RecordTimestamp, NotifyCustomer],
            OrderStatus::Cancelled => &[ReleaseStock, RecordTimestamp, NotifyCustomer],
        }
    }

    pub fn has_effect(&self, effect: EntryEffect) -> bool {
        self.entry_effects().contains(&effect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}
