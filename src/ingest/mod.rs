pub mod transport;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::models::notification::{Channel, NotificationType, Priority};
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;

pub use transport::{spawn_event_consumer, ChannelEventTransport, EventTransport};

/// How many sub-batch items run through the Dispatcher concurrently when a
/// bulk message is ingested (§4.7). Named distinctly from a hypothetical
/// producer's own chunk size, since the two sides tune independently.
const CONSUMER_SUBBATCH: usize = 100;

/// Inbound event as read off the upstream event stream (C7). The real
/// broker (Kafka or similar) is an out-of-scope external collaborator
/// (§1); `EventTransport` is the seam a real client would plug into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub topic: String,
    pub event_type: String,
    pub user_id: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub recipients: HashMap<Channel, String>,
}

/// A bulk message as described in §4.7: `{ batchId, totalNotifications,
/// chunkIndex, totalChunks, bulkNotifications[] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkEventMessage {
    pub batch_id: String,
    pub total_notifications: usize,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub bulk_notifications: Vec<InboundEvent>,
}

/// What a (topic, eventType) pair resolves to: either a dispatch target, or
/// an explicit no-op (distinct from an unrecognised/malformed pair).
enum EventAction {
    Dispatch(NotificationType, Channel, Priority),
    NoOp,
}

/// Demultiplexes a (topic, eventType) pair exactly per the table in §4.7.
/// Unrecognised combinations return `None`, which the caller treats as
/// malformed; `USER_UPDATED` is a recognised pair that intentionally does
/// nothing.
fn resolve_event_action(topic: &str, event_type: &str) -> Option<EventAction> {
    use EventAction::Dispatch;
    use NotificationType::*;

    Some(match (topic, event_type) {
        ("user.events", "USER_REGISTERED") => Dispatch(Welcome, Channel::Email, Priority::Normal),
        ("user.events", "USER_UPDATED") => EventAction::NoOp,
        ("auth.events", "PASSWORD_RESET_REQUESTED") => Dispatch(PasswordReset, Channel::Email, Priority::High),
        ("auth.events", "EMAIL_VERIFICATION_REQUESTED") => {
            Dispatch(EmailVerification, Channel::Email, Priority::Normal)
        }
        ("order.events", "ORDER_CREATED") => Dispatch(OrderConfirmation, Channel::Email, Priority::Normal),
        ("order.events", "ORDER_SHIPPED") => Dispatch(OrderShipped, Channel::Push, Priority::Normal),
        ("order.events", "ORDER_DELIVERED") => Dispatch(OrderDelivered, Channel::Push, Priority::Normal),
        ("payment.events", "PAYMENT_SUCCESS") => Dispatch(PaymentSuccess, Channel::Email, Priority::Normal),
        ("payment.events", "PAYMENT_FAILED") => Dispatch(PaymentFailed, Channel::Email, Priority::High),
        _ => return None,
    })
}

/// The literal title/message an event carries absent any active template
/// (§4.1, §4.5 fallback). Events have no caller-supplied content the way a
/// direct `SendNotification` call does, so the Ingestor synthesizes
/// reasonable raw copy from the event's own variables.
fn default_content(notification_type: NotificationType, variables: &HashMap<String, String>) -> (String, String) {
    let var = |key: &str| variables.get(key).cloned().unwrap_or_default();

    match notification_type {
        NotificationType::Welcome => (
            "Welcome!".to_string(),
            format!("Hi {}, welcome aboard!", var("userName")),
        ),
        NotificationType::PasswordReset => (
            "Password reset requested".to_string(),
            "A password reset was requested for your account.".to_string(),
        ),
        NotificationType::EmailVerification => (
            "Verify your email".to_string(),
            "Please verify your email address to finish setting up your account.".to_string(),
        ),
        NotificationType::OrderConfirmation => (
            "Order confirmed".to_string(),
            format!("Your order {} has been confirmed.", var("orderId")),
        ),
        NotificationType::OrderShipped => (
            "Order shipped".to_string(),
            format!("Your order {} has shipped. Tracking: {}.", var("orderId"), var("trackingNumber")),
        ),
        NotificationType::OrderDelivered => (
            "Order delivered".to_string(),
            format!("Your order {} has been delivered.", var("orderId")),
        ),
        NotificationType::PaymentSuccess => (
            "Payment successful".to_string(),
            "Your payment was processed successfully.".to_string(),
        ),
        NotificationType::PaymentFailed => (
            "Payment failed".to_string(),
            "Your payment could not be processed.".to_string(),
        ),
    }
}

#[derive(Clone)]
pub struct Ingestor {
    dispatcher: Dispatcher,
    metrics: std::sync::Arc<Metrics>,
}

impl Ingestor {
    pub fn new(dispatcher: Dispatcher, metrics: std::sync::Arc<Metrics>) -> Self {
        Self { dispatcher, metrics }
    }

    pub async fn handle_event(&self, event: InboundEvent) -> AppResult<()> {
        let action = resolve_event_action(&event.topic, &event.event_type).ok_or_else(|| {
            self.metrics.record_event_malformed();
            AppError::EventMalformed(format!(
                "no notification mapping for topic={} event_type={}",
                event.topic, event.event_type
            ))
        })?;

        let (notification_type, channel, priority) = match action {
            EventAction::Dispatch(notification_type, channel, priority) => (notification_type, channel, priority),
            EventAction::NoOp => {
                self.metrics.record_event_ingested();
                return Ok(());
            }
        };

        let (title, message) = default_content(notification_type, &event.variables);

        self.dispatcher
            .dispatch(DispatchRequest {
                user_id: event.user_id,
                notification_type,
                title,
                message,
                variables: event.variables,
                priority,
                scheduled_at: None,
                recipients: event.recipients,
                channel: Some(channel),
            })
            .await?;

        self.metrics.record_event_ingested();
        Ok(())
    }

    /// Bulk ingestion processes each event independently; one malformed or
    /// failed event does not abort the batch (mirrors the per-item
    /// independence called for in bulk dispatch).
    pub async fn handle_batch(&self, events: Vec<InboundEvent>) -> Vec<AppResult<()>> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            results.push(self.handle_event(event).await);
        }
        results
    }

    /// Handles a bulk-topic message (§4.7): partitions the embedded list
    /// into `CONSUMER_SUBBATCH`-sized chunks run concurrently, with
    /// per-notification failures isolated from the rest of the batch.
    /// Logs throughput and success counts for the whole message.
    pub async fn handle_bulk(&self, message: BulkEventMessage) -> Vec<AppResult<()>> {
        let started = std::time::Instant::now();
        let total = message.bulk_notifications.len();
        let mut results = Vec::with_capacity(total);

        for chunk in message.bulk_notifications.chunks(CONSUMER_SUBBATCH) {
            let sends = chunk.iter().cloned().map(|event| {
                let ingestor = self.clone();
                async move { ingestor.handle_event(event).await }
            });
            results.extend(futures::future::join_all(sends).await);
        }

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        tracing::info!(
            batch_id = %message.batch_id,
            chunk_index = message.chunk_index,
            total_chunks = message.total_chunks,
            total,
            succeeded,
            failed = total - succeeded,
            throughput_per_second = total as f64 / elapsed,
            "processed bulk notification message"
        );

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_topic_and_event_type_pairs_resolve() {
        assert!(matches!(
            resolve_event_action("user.events", "USER_REGISTERED"),
            Some(EventAction::Dispatch(NotificationType::Welcome, Channel::Email, Priority::Normal))
        ));
        assert!(matches!(
            resolve_event_action("order.events", "ORDER_SHIPPED"),
            Some(EventAction::Dispatch(NotificationType::OrderShipped, Channel::Push, Priority::Normal))
        ));
        assert!(matches!(
            resolve_event_action("payment.events", "PAYMENT_FAILED"),
            Some(EventAction::Dispatch(NotificationType::PaymentFailed, Channel::Email, Priority::High))
        ));
    }

    #[test]
    fn user_updated_is_a_recognised_no_op() {
        assert!(matches!(resolve_event_action("user.events", "USER_UPDATED"), Some(EventAction::NoOp)));
    }

    #[test]
    fn unrecognised_pairs_resolve_to_none() {
        assert!(resolve_event_action("user.events", "USER_DELETED").is_none());
        assert!(resolve_event_action("carts.events", "ABANDONED").is_none());
    }

    #[tokio::test]
    async fn transport_hands_back_events_in_fifo_order() {
        let (tx, mut transport) = ChannelEventTransport::new(4);
        tx.send(InboundEvent {
            topic: "user.events".to_string(),
            event_type: "USER_REGISTERED".to_string(),
            user_id: "user-1".to_string(),
            variables: HashMap::new(),
            recipients: HashMap::new(),
        })
        .await
        .unwrap();
        drop(tx);

        let first = transport.recv().await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().event_type, "USER_REGISTERED");

        let second = transport.recv().await.unwrap();
        assert!(second.is_none());
    }
}
