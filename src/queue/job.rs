use serde::{Deserialize, Serialize};

use crate::db::models::notification::{Channel, Priority};

/// Unit of work placed on a channel work queue. Carries just enough to let
/// a worker claim and process the notification without a store round trip
/// before it knows there is work at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub notification_id: String,
    pub channel: Channel,
    pub priority: Priority,
    pub enqueued_at_millis: i64,
    pub attempt: u32,
    /// How many times this job has been reassigned by the stalled-job
    /// sweep after a worker popped it but never reported back (§4.4).
    /// Capped at `maxStalledCount` (1); a job stalled again after that is
    /// declared dead instead of reassigned a second time.
    #[serde(default)]
    pub stalled_count: u32,
}

impl QueueJob {
    pub fn new(notification_id: impl Into<String>, channel: Channel, priority: Priority) -> Self {
        Self {
            notification_id: notification_id.into(),
            channel,
            priority,
            enqueued_at_millis: chrono::Utc::now().timestamp_millis(),
            attempt: 0,
            stalled_count: 0,
        }
    }

    /// Composite score: higher priority sorts first, FIFO within a priority
    /// tier. `ZPOPMIN` returns the lowest score, so priority is inverted.
    pub fn score(&self) -> f64 {
        let priority_rank = (100 - self.priority.weight()) as f64;
        priority_rank * 1e13 + self.enqueued_at_millis as f64
    }
}
