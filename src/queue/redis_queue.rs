use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::db::models::notification::Channel;
use crate::error::{AppError, AppResult};

use super::job::QueueJob;

/// Priority + delay work queue for a single channel, backed by Redis sorted
/// sets: a `ready` set ordered by `QueueJob::score`, a `delayed` set ordered
/// by the millisecond timestamp a job becomes eligible, and an `active` set
/// ordered by the millisecond deadline a popped job must report back by
/// before the stalled-job sweep reassigns it. Job payloads live in plain
/// string keys so the sorted sets only ever carry ids, matching the split
/// used by Redis-backed mail queues that need cheap `ZCARD`/`ZRANGEBYSCORE`
/// introspection without deserializing every payload (§4.4).
///
/// `completed`/`failed` are capped lists (`LPUSH` + `LTRIM`) holding the
/// last few terminal job records per channel for observability, not for
/// replay.
#[derive(Clone)]
pub struct ChannelQueue {
    conn: ConnectionManager,
}

const MAX_COMPLETED_RECORDS: isize = 4; // last 5 (0..=4)
const MAX_FAILED_RECORDS: isize = 2; // last 3 (0..=2)

impl ChannelQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn ready_key(channel: Channel) -> String {
        format!("queue:{}:ready", channel.queue_name())
    }

    fn delayed_key(channel: Channel) -> String {
        format!("queue:{}:delayed", channel.queue_name())
    }

    fn active_key(channel: Channel) -> String {
        format!("queue:{}:active", channel.queue_name())
    }

    fn completed_key(channel: Channel) -> String {
        format!("queue:{}:completed", channel.queue_name())
    }

    fn failed_key(channel: Channel) -> String {
        format!("queue:{}:failed", channel.queue_name())
    }

    fn job_key(id: &str) -> String {
        format!("queue:job:{}", id)
    }

    /// Enqueue a job. `delay_millis` of `0` makes it immediately eligible.
    pub async fn push(&self, job: &QueueJob, delay_millis: i64) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let blob = serde_json::to_string(job)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to serialize queue job: {e}")))?;

        let _: () = conn
            .set(Self::job_key(&job.notification_id), blob)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;

        if delay_millis <= 0 {
            let _: () = conn
                .zadd(Self::ready_key(job.channel), &job.notification_id, job.score())
                .await
                .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        } else {
            let available_at = chrono::Utc::now().timestamp_millis() + delay_millis;
            let _: () = conn
                .zadd(Self::delayed_key(job.channel), &job.notification_id, available_at as f64)
                .await
                .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    /// Move delayed jobs whose eligibility time has passed into the ready
    /// set. Called periodically by the worker pool's reclaim loop (§4.5).
    pub async fn reclaim_due(&self, channel: Channel) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let now = chrono::Utc::now().timestamp_millis();

        let due: Vec<String> = conn
            .zrangebyscore(Self::delayed_key(channel), 0, now)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;

        let mut moved = 0u64;
        for id in due {
            let blob: Option<String> = conn
                .get(Self::job_key(&id))
                .await
                .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
            let Some(blob) = blob else { continue };
            let job: QueueJob = serde_json::from_str(&blob)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt queue job {id}: {e}")))?;

            let _: () = conn
                .zrem(Self::delayed_key(channel), &id)
                .await
                .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
            let _: () = conn
                .zadd(Self::ready_key(channel), &id, job.score())
                .await
                .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
            moved += 1;
        }
        Ok(moved)
    }

    /// Reassigns jobs whose `active` deadline has passed back into the
    /// ready set, at most once per job (`max_stalled_count`). A job stalled
    /// again after already being reassigned is declared dead: its payload
    /// is dropped and its id is returned so the caller can finalize the
    /// owning notification to `FAILED` (§4.4).
    pub async fn reclaim_stalled(&self, channel: Channel, max_stalled_count: u32) -> AppResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let now = chrono::Utc::now().timestamp_millis();

        let stalled: Vec<String> = conn
            .zrangebyscore(Self::active_key(channel), 0, now)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;

        let mut dead = Vec::new();
        for id in stalled {
            let _: () = conn
                .zrem(Self::active_key(channel), &id)
                .await
                .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;

            let blob: Option<String> = conn
                .get(Self::job_key(&id))
                .await
                .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
            let Some(blob) = blob else { continue };
            let mut job: QueueJob = serde_json::from_str(&blob)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt queue job {id}: {e}")))?;

            if job.stalled_count >= max_stalled_count {
                let _: () = conn
                    .del(Self::job_key(&id))
                    .await
                    .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
                dead.push(id);
            } else {
                job.stalled_count += 1;
                job.enqueued_at_millis = chrono::Utc::now().timestamp_millis();
                let blob = serde_json::to_string(&job)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to serialize queue job: {e}")))?;
                let _: () = conn
                    .set(Self::job_key(&id), blob)
                    .await
                    .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
                let _: () = conn
                    .zadd(Self::ready_key(channel), &id, job.score())
                    .await
                    .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
            }
        }
        Ok(dead)
    }

    /// Pop the highest-priority, earliest-enqueued ready job, if any, and
    /// mark it active with a deadline `stalled_after_millis` in the future.
    pub async fn pop(&self, channel: Channel, stalled_after_millis: i64) -> AppResult<Option<QueueJob>> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = conn
            .zpopmin(Self::ready_key(channel), 1)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;

        let Some((id, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };

        let blob: Option<String> = conn
            .get(Self::job_key(&id))
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;

        match blob {
            Some(blob) => {
                let job: QueueJob = serde_json::from_str(&blob)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt queue job {id}: {e}")))?;
                let deadline = chrono::Utc::now().timestamp_millis() + stalled_after_millis;
                let _: () = conn
                    .zadd(Self::active_key(channel), &id, deadline as f64)
                    .await
                    .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Delivery succeeded or was dead-lettered: drop the payload and clear
    /// the active-set entry so the stalled sweep doesn't reassign it.
    pub async fn complete(&self, channel: Channel, notification_id: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(Self::job_key(notification_id))
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        let _: () = conn
            .zrem(Self::active_key(channel), notification_id)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Requeue with a bumped attempt count after a transient failure.
    /// Clears the active-set entry first, matching `complete`.
    pub async fn requeue_with_backoff(&self, mut job: QueueJob, delay_millis: i64) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zrem(Self::active_key(job.channel), &job.notification_id)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        job.attempt += 1;
        job.enqueued_at_millis = chrono::Utc::now().timestamp_millis();
        self.push(&job, delay_millis).await
    }

    pub async fn depth(&self, channel: Channel) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let ready: u64 = conn
            .zcard(Self::ready_key(channel))
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        let delayed: u64 = conn
            .zcard(Self::delayed_key(channel))
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        Ok(ready + delayed)
    }

    /// Number of jobs a worker has popped but not yet reported back on.
    pub async fn active_count(&self, channel: Channel) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        conn.zcard(Self::active_key(channel))
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))
    }

    pub async fn record_completed(&self, channel: Channel, notification_id: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let record = serde_json::json!({
            "notification_id": notification_id,
            "at": chrono::Utc::now().timestamp_millis(),
        })
        .to_string();
        let _: () = conn
            .lpush(Self::completed_key(channel), record)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        let _: () = conn
            .ltrim(Self::completed_key(channel), 0, MAX_COMPLETED_RECORDS)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn record_failed(&self, channel: Channel, notification_id: &str, error: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let record = serde_json::json!({
            "notification_id": notification_id,
            "error": error,
            "at": chrono::Utc::now().timestamp_millis(),
        })
        .to_string();
        let _: () = conn
            .lpush(Self::failed_key(channel), record)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        let _: () = conn
            .ltrim(Self::failed_key(channel), 0, MAX_FAILED_RECORDS)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn recent_completed(&self, channel: Channel) -> AppResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(Self::completed_key(channel), 0, -1)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))
    }

    pub async fn recent_failed(&self, channel: Channel) -> AppResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(Self::failed_key(channel), 0, -1)
            .await
            .map_err(|e| AppError::QueueUnavailable(e.to_string()))
    }
}
