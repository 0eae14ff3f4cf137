use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::notification::Channel;
use crate::db::models::preference::{SetUserPreference, UserPreference, UserPreferenceRow};
use crate::error::{AppError, AppResult};

/// Per-user, per-channel opt-in/opt-out state consulted by the channel
/// resolver (C2) before a notification is fanned out.
#[derive(Clone)]
pub struct PreferenceRepository {
    pool: SqlitePool,
}

impl PreferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<UserPreference>> {
        let rows = sqlx::query_as::<_, UserPreferenceRow>(
            "SELECT id, user_id, channel, is_enabled, created_at, updated_at FROM user_preferences WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        rows.into_iter().map(UserPreference::try_from).collect()
    }

    /// Enabled-by-default: a missing row means the channel is allowed.
    pub async fn is_enabled(&self, user_id: &str, channel: Channel) -> AppResult<bool> {
        let row = sqlx::query_as::<_, UserPreferenceRow>(
            "SELECT id, user_id, channel, is_enabled, created_at, updated_at FROM user_preferences WHERE user_id = ? AND channel = ?",
        )
        .bind(user_id)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        Ok(row.map(|r| r.is_enabled).unwrap_or(true))
    }

    pub async fn set(&self, user_id: &str, input: SetUserPreference) -> AppResult<UserPreference> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, UserPreferenceRow>(
            r#"
            INSERT INTO user_preferences (id, user_id, channel, is_enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, channel) DO UPDATE SET
                is_enabled = excluded.is_enabled,
                updated_at = excluded.updated_at
            RETURNING id, user_id, channel, is_enabled, created_at, updated_at
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(input.channel.as_str())
        .bind(input.is_enabled)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        row.try_into()
    }
}
