//! Order domain events and the customer notifications derived from them.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::event::DomainEvent;
use crate::Money;

use super::{OrderNumber, OrderStatus};

/// Facts recorded in an order's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was created by checkout.
    Placed(OrderPlacedData),

    /// Status moved along a legal edge.
    StatusChanged(StatusChangedData),

    /// Ordered units went back to inventory.
    StockReleased(StockReleasedData),

    TrackingAssigned(TrackingAssignedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::StockReleased(_) => "OrderStockReleased",
            OrderEvent::TrackingAssigned(_) => "OrderTrackingAssigned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: UserId,
    pub total_amount: Money,
    pub item_count: usize,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

/// One product's worth of released stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasedLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleasedData {
    pub lines: Vec<ReleasedLine>,
    pub released_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingAssignedData {
    pub tracking_number: String,
    pub assigned_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn status_changed(from: OrderStatus, to: OrderStatus, at: DateTime<Utc>) -> Self {
        OrderEvent::StatusChanged(StatusChangedData {
            from,
            to,
            changed_at: at,
        })
    }

    /// Notification owed to the customer for this event, if any.
    pub fn notification(&self) -> Option<NotificationKind> {
        match self {
            OrderEvent::Placed(_) => Some(NotificationKind::Placed),
            OrderEvent::StatusChanged(data) => NotificationKind::for_status(data.to),
            OrderEvent::StockReleased(_) | OrderEvent::TrackingAssigned(_) => None,
        }
    }
}

/// Severity of a customer notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Success,
    Warning,
}

/// Customer-visible order events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Placed,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl NotificationKind {
    pub fn for_status(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Pending => None,
            OrderStatus::Confirmed => Some(NotificationKind::Confirmed),
            OrderStatus::Processing => Some(NotificationKind::Processing),
            OrderStatus::Shipped => Some(NotificationKind::Shipped),
            OrderStatus::Delivered => Some(NotificationKind::Delivered),
            OrderStatus::Cancelled => Some(NotificationKind::Cancelled),
            OrderStatus::Refunded => Some(NotificationKind::Refunded),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::Placed => "Order Placed",
            NotificationKind::Confirmed => "Order Confirmed",
            NotificationKind::Processing => "Order Processing",
            NotificationKind::Shipped => "Order Shipped",
            NotificationKind::Delivered => "Order Delivered",
            NotificationKind::Cancelled => "Order Cancelled",
            NotificationKind::Refunded => "Order Refunded",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            NotificationKind::Processing | NotificationKind::Refunded => Severity::Info,
            NotificationKind::Cancelled => Severity::Warning,
            NotificationKind::Placed
            | NotificationKind::Confirmed
            | NotificationKind::Shipped
            | NotificationKind::Delivered => Severity::Success,
        }
    }

    pub fn message(&self, order_number: &OrderNumber) -> String {
        match self {
            NotificationKind::Placed => format!(
                "Thank you! Your order #{order_number} has been placed and is awaiting confirmation."
            ),
            NotificationKind::Confirmed => format!(
                "Your order #{order_number} has been confirmed and is being prepared for shipment."
            ),
            NotificationKind::Processing => {
                format!("Your order #{order_number} is now being processed.")
            }
            NotificationKind::Shipped => format!(
                "Good news! Your order #{order_number} has been shipped and is on its way."
            ),
            NotificationKind::Delivered => format!(
                "Your order #{order_number} has been delivered. We hope you enjoy your sustainable purchase!"
            ),
            NotificationKind::Cancelled => {
                format!("Your order #{order_number} has been cancelled.")
            }
            NotificationKind::Refunded => format!(
                "Your order #{order_number} has been refunded. The amount will be credited to your account."
            ),
        }
    }
}

/// A rendered message for the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub link: String,
}

impl Notification {
    pub fn new(
        recipient: UserId,
        order_id: OrderId,
        order_number: &OrderNumber,
        kind: NotificationKind,
    ) -> Self {
        Self {
            recipient,
            order_id,
            order_number: order_number.clone(),
            kind,
            title: kind.title().to_string(),
            message: kind.message(order_number),
            severity: kind.severity(),
            link: format!("/dashboard/orders/{order_id}"),
        }
    }
}
