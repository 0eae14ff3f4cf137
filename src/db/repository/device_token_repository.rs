use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::device_token::{DeviceToken, DeviceTokenRow, RegisterDeviceToken};
use crate::error::{AppError, AppResult};

/// Push-channel routing data: which device tokens a user has registered.
#[derive(Clone)]
pub struct DeviceTokenRepository {
    pool: SqlitePool,
}

impl DeviceTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, user_id: &str, input: RegisterDeviceToken) -> AppResult<DeviceToken> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, DeviceTokenRow>(
            r#"
            INSERT INTO device_tokens (id, user_id, token, platform, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, TRUE, ?, ?)
            ON CONFLICT(user_id, token) DO UPDATE SET
                platform = excluded.platform,
                is_active = TRUE,
                updated_at = excluded.updated_at
            RETURNING id, user_id, token, platform, is_active, created_at, updated_at
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&input.token)
        .bind(input.platform.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        row.try_into()
    }

    pub async fn active_for_user(&self, user_id: &str) -> AppResult<Vec<DeviceToken>> {
        let rows = sqlx::query_as::<_, DeviceTokenRow>(
            "SELECT id, user_id, token, platform, is_active, created_at, updated_at FROM device_tokens WHERE user_id = ? AND is_active = TRUE",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        rows.into_iter().map(DeviceToken::try_from).collect()
    }

    pub async fn deactivate(&self, token: &str) -> AppResult<()> {
        sqlx::query("UPDATE device_tokens SET is_active = FALSE, updated_at = ? WHERE token = ?")
            .bind(Utc::now().naive_utc())
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }
}
