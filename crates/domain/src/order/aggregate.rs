//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::{Money, PricingPolicy, Totals};

use super::{
    EntryEffect, OrderError, OrderEvent, OrderItem, OrderNumber, OrderStatus, PaymentMethod,
    PaymentStatus, ShippingDetails,
    events::{OrderPlacedData, ReleasedLine, StockReleasedData, TrackingAssignedData},
};

/// Order aggregate root.
///
/// Line items and totals are frozen when the order is placed. Afterwards only
/// the status, the tracking number and the status timestamps change, and only
/// through [`Order::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    customer_id: UserId,
    items: Vec<OrderItem>,
    shipping: ShippingDetails,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    totals: Totals,
    status: OrderStatus,
    tracking_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

/// Inputs captured at checkout.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub customer_id: UserId,
    pub items: Vec<OrderItem>,
    pub shipping: ShippingDetails,
    pub payment_method: PaymentMethod,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn customer_id(&self) -> UserId {
        self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn shipping(&self) -> &ShippingDetails {
        &self.shipping
    }

    pub fn payment_method(&self) -> &PaymentMethod {
        &self.payment_method
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn subtotal(&self) -> Money {
        self.totals.subtotal
    }

    pub fn shipping_cost(&self) -> Money {
        self.totals.shipping_cost
    }

    pub fn tax(&self) -> Money {
        self.totals.tax
    }

    pub fn total_amount(&self) -> Money {
        self.totals.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Total number of units across all lines.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Returns true if the seller owns at least one line of this order.
    pub fn involves_seller(&self, seller_id: UserId) -> bool {
        self.items.iter().any(|item| item.seller_id == seller_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods (return events)
impl Order {
    /// Builds a `Pending` order from frozen line items.
    ///
    /// Totals are computed here from the snapshots, never from live products.
    pub fn place(
        new: NewOrder,
        pricing: &PricingPolicy,
        at: DateTime<Utc>,
    ) -> Result<(Order, OrderEvent), OrderError> {
        if new.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(item) = new.items.iter().find(|item| item.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
            });
        }
        let missing = new.shipping.missing_fields();
        if !missing.is_empty() {
            return Err(OrderError::IncompleteShipping { fields: missing });
        }

        let subtotal: Money = new.items.iter().map(|item| item.line_total).sum();
        let totals = pricing.quote(subtotal);

        let order = Order {
            id: OrderId::new(),
            order_number: new.order_number,
            customer_id: new.customer_id,
            items: new.items,
            shipping: new.shipping,
            payment_method: new.payment_method,
            payment_status: PaymentStatus::Pending,
            totals,
            status: OrderStatus::Pending,
            tracking_number: None,
            created_at: at,
            updated_at: at,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        };

        let event = OrderEvent::Placed(OrderPlacedData {
            order_id: order.id,
            order_number: order.order_number.clone(),
            customer_id: order.customer_id,
            total_amount: order.totals.total,
            item_count: order.items.len(),
            placed_at: at,
        });

        Ok((order, event))
    }

    /// Decides the events for moving to `to`.
    ///
    /// Requesting the current status yields no events. Entering a status that
    /// releases stock also yields a `StockReleased` event listing every line.
    pub fn decide_transition(
        &self,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if to == self.status {
            return Ok(Vec::new());
        }
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        let mut events = vec![OrderEvent::status_changed(self.status, to, at)];
        if to.has_effect(EntryEffect::ReleaseStock) {
            events.push(OrderEvent::StockReleased(StockReleasedData {
                lines: self
                    .items
                    .iter()
                    .map(|item| ReleasedLine {
                        product_id: item.product_id,
                        quantity: item.quantity,
                    })
                    .collect(),
                released_at: at,
            }));
        }
        Ok(events)
    }

    /// Decides the events for attaching a tracking number.
    pub fn decide_tracking(
        &self,
        tracking_number: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let tracking_number = tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(OrderError::EmptyTrackingNumber);
        }
        if !self.status.accepts_tracking() {
            return Err(OrderError::TrackingNotAllowed {
                status: self.status,
            });
        }
        if self.tracking_number.as_deref() == Some(tracking_number) {
            return Ok(Vec::new());
        }
        Ok(vec![OrderEvent::TrackingAssigned(TrackingAssignedData {
            tracking_number: tracking_number.to_string(),
            assigned_at: at,
        })])
    }

    /// Applies an event. Pure and infallible.
    pub fn apply(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::Placed(_) | OrderEvent::StockReleased(_) => {}
            OrderEvent::StatusChanged(data) => {
                self.status = data.to;
                self.updated_at = data.changed_at;
                if data.to.has_effect(EntryEffect::RecordTimestamp) {
                    self.record_timestamp(data.to, data.changed_at);
                }
            }
            OrderEvent::TrackingAssigned(data) => {
                self.tracking_number = Some(data.tracking_number.clone());
                self.updated_at = data.assigned_at;
            }
        }
    }

    pub fn apply_events<'a>(&mut self, events: impl IntoIterator<Item = &'a OrderEvent>) {
        for event in events {
            self.apply(event);
        }
    }

    // An already-set milestone is never overwritten.
    fn record_timestamp(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        let slot = match status {
            OrderStatus::Shipped => &mut self.shipped_at,
            OrderStatus::Delivered => &mut self.delivered_at,
            OrderStatus::Cancelled => &mut self.cancelled_at,
            _ => return,
        };
        slot.get_or_insert(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Product;
    use chrono::Duration;

    fn shipping() -> ShippingDetails {
        ShippingDetails {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "555-0100".into(),
            address: "12 Engine St".into(),
            city: "London".into(),
            state: "LDN".into(),
            zip_code: "N1".into(),
            country: "UK".into(),
            notes: None,
        }
    }

    fn placed_order() -> Order {
        let seller = UserId::new();
        let a = Product::new(seller, "A", "A-1", Money::from_cents(1000), 2);
        let b = Product::new(seller, "B", "B-1", Money::from_cents(500), 1);
        let new = NewOrder {
            order_number: OrderNumber::from("ORD-1-1"),
            customer_id: UserId::new(),
            items: vec![OrderItem::snapshot(&a, 2), OrderItem::snapshot(&b, 1)],
            shipping: shipping(),
            payment_method: PaymentMethod::default(),
        };
        Order::place(new, &PricingPolicy::default(), Utc::now()).unwrap().0
    }

    fn transition(order: &mut Order, to: OrderStatus) -> Vec<OrderEvent> {
        let events = order.decide_transition(to, Utc::now()).unwrap();
        order.apply_events(&events);
        events
    }

    #[test]
    fn test_total_quantity_of_large_lines() {
        let seller = UserId::new();
        let a = Product::new(seller, "A", "A-1", Money::from_cents(1), 0);
        let b = Product::new(seller, "B", "B-1", Money::from_cents(1), 0);
        let new = NewOrder {
            order_number: OrderNumber::from("ORD-1-2"),
            customer_id: UserId::new(),
            items: vec![
                OrderItem::snapshot(&a, crate::MAX_LINE_QUANTITY),
                OrderItem::snapshot(&b, crate::MAX_LINE_QUANTITY),
            ],
            shipping: shipping(),
            payment_method: PaymentMethod::default(),
        };
        let (order, _) = Order::place(new, &PricingPolicy::default(), Utc::now()).unwrap();
        assert_eq!(order.total_quantity(), 2 * u64::from(crate::MAX_LINE_QUANTITY));
    }

    #[test]
    fn test_place_computes_totals() {
        let order = placed_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.subtotal(), Money::from_cents(2500));
        assert_eq!(order.shipping_cost(), Money::from_cents(1000));
        assert_eq!(order.tax(), Money::from_cents(250));
        assert_eq!(order.total_amount(), Money::from_cents(3750));
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.payment_method().as_str(), "COD");
    }

    #[test]
    fn test_place_rejects_empty() {
        let new = NewOrder {
            order_number: OrderNumber::from("ORD-1-1"),
            customer_id: UserId::new(),
            items: vec![],
            shipping: shipping(),
            payment_method: PaymentMethod::default(),
        };
        assert!(matches!(
            Order::place(new, &PricingPolicy::default(), Utc::now()),
            Err(OrderError::NoItems)
        ));
    }

    #[test]
    fn test_place_rejects_blank_shipping() {
        let mut details = shipping();
        details.email = String::new();
        let p = Product::new(UserId::new(), "A", "A-1", Money::from_cents(100), 1);
        let new = NewOrder {
            order_number: OrderNumber::from("ORD-1-1"),
            customer_id: UserId::new(),
            items: vec![OrderItem::snapshot(&p, 1)],
            shipping: details,
            payment_method: PaymentMethod::default(),
        };
        assert!(matches!(
            Order::place(new, &PricingPolicy::default(), Utc::now()),
            Err(OrderError::IncompleteShipping { fields }) if fields == vec!["email"]
        ));
    }

    #[test]
    fn test_happy_path() {
        let mut order = placed_order();
        for to in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let events = transition(&mut order, to);
            assert_eq!(events.len(), 1);
            assert_eq!(order.status(), to);
        }
        assert!(order.shipped_at().is_some());
        assert!(order.delivered_at().is_some());
        assert!(order.cancelled_at().is_none());
    }

    #[test]
    fn test_skip_is_rejected() {
        let order = placed_order();
        let err = order
            .decide_transition(OrderStatus::Shipped, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped
            }
        ));
    }

    #[test]
    fn test_cancel_emits_stock_release() {
        let mut order = placed_order();
        let events = transition(&mut order, OrderStatus::Cancelled);

        assert_eq!(events.len(), 2);
        let OrderEvent::StockReleased(released) = &events[1] else {
            panic!("expected StockReleased, got {:?}", events[1]);
        };
        let units: u32 = released.lines.iter().map(|l| l.quantity).sum();
        assert_eq!(units, 3);
        assert!(order.cancelled_at().is_some());
    }

    #[test]
    fn test_same_status_is_noop() {
        let mut order = placed_order();
        transition(&mut order, OrderStatus::Cancelled);
        let stamped = order.cancelled_at();

        let events = order
            .decide_transition(OrderStatus::Cancelled, Utc::now())
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(order.cancelled_at(), stamped);
    }

    #[test]
    fn test_terminal_rejects_everything() {
        let mut order = placed_order();
        transition(&mut order, OrderStatus::Cancelled);
        for to in [OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Refunded] {
            assert!(order.decide_transition(to, Utc::now()).is_err());
        }
    }

    #[test]
    fn test_timestamp_never_overwritten() {
        let mut order = placed_order();
        let first = Utc::now();
        order.apply(&OrderEvent::status_changed(
            OrderStatus::Processing,
            OrderStatus::Shipped,
            first,
        ));
        order.apply(&OrderEvent::status_changed(
            OrderStatus::Processing,
            OrderStatus::Shipped,
            first + Duration::hours(1),
        ));
        assert_eq!(order.shipped_at(), Some(first));
    }

    #[test]
    fn test_tracking_number() {
        let mut order = placed_order();
        let events = order.decide_tracking(" TRK-9 ", Utc::now()).unwrap();
        order.apply_events(&events);
        assert_eq!(order.tracking_number(), Some("TRK-9"));

        assert!(order.decide_tracking("TRK-9", Utc::now()).unwrap().is_empty());
        assert!(matches!(
            order.decide_tracking("  ", Utc::now()),
            Err(OrderError::EmptyTrackingNumber)
        ));

        transition(&mut order, OrderStatus::Cancelled);
        assert!(matches!(
            order.decide_tracking("TRK-10", Utc::now()),
            Err(OrderError::TrackingNotAllowed { .. })
        ));
    }

    #[test]
    fn test_involves_seller() {
        let order = placed_order();
        let seller = order.items()[0].seller_id;
        assert!(order.involves_seller(seller));
        assert!(!order.involves_seller(UserId::new()));
    }

    #[test]
    fn test_serde_round_trip_keeps_snapshot() {
        let order = placed_order();
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
