//! Outbound customer notifications.
//!
//! Delivery is fire-and-forget: it happens after the unit of work commits,
//! and a failure is logged and counted, never retried or rolled back.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Notification, NotificationKind, Order};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Collaborator that delivers customer notifications (email, inbox, ...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

#[async_trait]
impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        (**self).notify(notification).await
    }
}

/// Renders and delivers a notification, swallowing failures.
///
/// Returns true if the sink accepted it.
pub(crate) async fn deliver<N: NotificationSink + ?Sized>(
    sink: &N,
    order: &Order,
    kind: NotificationKind,
) -> bool {
    let notification = Notification::new(order.customer_id(), order.id(), order.order_number(), kind);
    match sink.notify(&notification).await {
        Ok(()) => {
            metrics::counter!("notifications_sent_total", "kind" => kind_label(kind)).increment(1);
            true
        }
        Err(err) => {
            tracing::warn!(
                order_id = %order.id(),
                order_number = %order.order_number(),
                ?kind,
                error = %err,
                "notification not delivered"
            );
            metrics::counter!("notifications_failed_total", "kind" => kind_label(kind))
                .increment(1);
            false
        }
    }
}

fn kind_label(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Placed => "placed",
        NotificationKind::Confirmed => "confirmed",
        NotificationKind::Processing => "processing",
        NotificationKind::Shipped => "shipped",
        NotificationKind::Delivered => "delivered",
        NotificationKind::Cancelled => "cancelled",
        NotificationKind::Refunded => "refunded",
    }
}

/// Sink that writes notifications to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::info!(
            recipient = %notification.recipient,
            order_number = %notification.order_number,
            title = %notification.title,
            severity = ?notification.severity,
            link = %notification.link,
            "{}",
            notification.message
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    delivered: Vec<Notification>,
    fail_on_notify: bool,
    attempts: usize,
}

/// In-memory sink for testing.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotificationSink {
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sink to reject every notification.
    pub async fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().await.fail_on_notify = fail;
    }

    /// Notifications accepted so far.
    pub async fn delivered(&self) -> Vec<Notification> {
        self.state.read().await.delivered.clone()
    }

    pub async fn delivered_kinds(&self) -> Vec<NotificationKind> {
        self.state
            .read()
            .await
            .delivered
            .iter()
            .map(|n| n.kind)
            .collect()
    }

    /// Every notify call, including rejected ones.
    pub async fn attempt_count(&self) -> usize {
        self.state.read().await.attempts
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        let mut state = self.state.write().await;
        state.attempts += 1;
        if state.fail_on_notify {
            return Err(NotificationError::Delivery("mail server down".to_string()));
        }
        state.delivered.push(notification.clone());
        Ok(())
    }
}
