use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::notification::{
    CreateNotification, Notification, NotificationRow, NotificationStatus, MAX_RETRIES,
};
use crate::error::{AppError, AppResult};

/// Relational store for the notification record itself (C3). Channel work
/// queue membership is tracked separately in Redis (§4.4); this repository
/// owns the durable, queryable record of what was sent, to whom, and why it
/// failed.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: CreateNotification) -> AppResult<Notification> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let metadata_json = serde_json::to_string(&input.metadata).unwrap_or_else(|_| "{}".to_string());

        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications (
                id, user_id, notification_type, channel, title, message, metadata,
                priority, scheduled_at, status, retry_count, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'QUEUED', 0, ?, ?)
            RETURNING id, user_id, notification_type, channel, title, message, metadata,
                      priority, scheduled_at, status, retry_count, created_at, updated_at,
                      sent_at, failed_at, error_message
            "#,
        )
        .bind(&id)
        .bind(&input.user_id)
        .bind(input.notification_type.as_str())
        .bind(input.channel.as_str())
        .bind(&input.title)
        .bind(&input.message)
        .bind(metadata_json)
        .bind(input.priority.as_str())
        .bind(input.scheduled_at)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        row.try_into()
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"SELECT id, user_id, notification_type, channel, title, message, metadata,
                      priority, scheduled_at, status, retry_count, created_at, updated_at,
                      sent_at, failed_at, error_message
               FROM notifications WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

        row.try_into()
    }

    /// Atomic claim: moves a `QUEUED` row to `PROCESSING` and hands back the
    /// row, mirroring the UPDATE...WHERE id=(SELECT...)...RETURNING idiom
    /// used to avoid double-delivery when more than one worker polls the
    /// same queue concurrently.
    pub async fn claim_for_processing(&self, id: &str) -> AppResult<Notification> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            UPDATE notifications
            SET status = 'PROCESSING', updated_at = ?
            WHERE id = (SELECT id FROM notifications WHERE id = ? AND status = 'QUEUED')
            RETURNING id, user_id, notification_type, channel, title, message, metadata,
                      priority, scheduled_at, status, retry_count, created_at, updated_at,
                      sent_at, failed_at, error_message
            "#,
        )
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("notification {id} is not queued")))?;

        row.try_into()
    }

    pub async fn mark_sent(&self, id: &str) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query("UPDATE notifications SET status = 'SENT', sent_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Records a failed delivery attempt. Requeues (`QUEUED`) if the retry
    /// budget allows it, otherwise terminally marks `FAILED`.
    pub async fn register_attempt_failure(&self, id: &str, error_message: &str) -> AppResult<NotificationStatus> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            UPDATE notifications
            SET retry_count = retry_count + 1,
                error_message = ?,
                updated_at = ?,
                status = CASE WHEN retry_count + 1 >= ? THEN 'FAILED' ELSE 'QUEUED' END,
                failed_at = CASE WHEN retry_count + 1 >= ? THEN ? ELSE failed_at END
            WHERE id = ?
            RETURNING id, user_id, notification_type, channel, title, message, metadata,
                      priority, scheduled_at, status, retry_count, created_at, updated_at,
                      sent_at, failed_at, error_message
            "#,
        )
        .bind(error_message)
        .bind(now)
        .bind(MAX_RETRIES)
        .bind(MAX_RETRIES)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

        let notification: Notification = row.try_into()?;
        Ok(notification.status)
    }

    /// Forces a row straight to terminal `FAILED`, bypassing the retry-count
    /// cycle entirely. Used for adapter-permanent failures (§7, "mark FAILED
    /// without retry") and for jobs declared dead by the stalled-job sweep,
    /// neither of which should get another delivery attempt. A no-op if the
    /// row already reached a terminal state.
    pub async fn mark_failed_terminal(&self, id: &str, error_message: &str) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'FAILED', error_message = ?, failed_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('QUEUED', 'PROCESSING')
            "#,
        )
        .bind(error_message)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn find_failed_for_retry(&self, limit: i64) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"SELECT id, user_id, notification_type, channel, title, message, metadata,
                      priority, scheduled_at, status, retry_count, created_at, updated_at,
                      sent_at, failed_at, error_message
               FROM notifications
               WHERE status = 'FAILED' AND retry_count < ?
               ORDER BY updated_at ASC
               LIMIT ?"#,
        )
        .bind(MAX_RETRIES)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    pub async fn list_by_user(&self, user_id: &str, limit: i64) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"SELECT id, user_id, notification_type, channel, title, message, metadata,
                      priority, scheduled_at, status, retry_count, created_at, updated_at,
                      sent_at, failed_at, error_message
               FROM notifications
               WHERE user_id = ?
               ORDER BY created_at DESC
               LIMIT ?"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    /// Deletes terminal (SENT/FAILED) rows older than `older_than_days`.
    /// Exposed for an operator-triggered cleanup; the dispatcher does not
    /// schedule it automatically (long-term archival is explicitly out of
    /// scope).
    pub async fn delete_stale(&self, older_than_days: i64) -> AppResult<u64> {
        let cutoff = Utc::now().naive_utc() - chrono::Duration::days(older_than_days);
        let result = sqlx::query(
            "DELETE FROM notifications WHERE status IN ('SENT', 'FAILED') AND updated_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
