use sqlx::SqlitePool;

use crate::db::models::notification::{Channel, NotificationType};
use crate::db::models::template::{NotificationTemplate, NotificationTemplateRow};
use crate::error::{AppError, AppResult};

/// Backs C1's cache-miss path: looks up the active template for a
/// (type, channel) pair.
#[derive(Clone)]
pub struct TemplateRepository {
    pool: SqlitePool,
}

impl TemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_active(
        &self,
        notification_type: NotificationType,
        channel: Channel,
    ) -> AppResult<NotificationTemplate> {
        let row = sqlx::query_as::<_, NotificationTemplateRow>(
            r#"SELECT id, notification_type, channel, is_active, title, message, html_content, created_at, updated_at
               FROM notification_templates
               WHERE notification_type = ? AND channel = ? AND is_active = TRUE
               LIMIT 1"#,
        )
        .bind(notification_type.as_str())
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?
        .ok_or_else(|| {
            AppError::TemplateRender(format!(
                "no active template for {} on {}",
                notification_type.as_str(),
                channel.as_str()
            ))
        })?;

        row.try_into()
    }
}
