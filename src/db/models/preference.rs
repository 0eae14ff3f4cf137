use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::notification::Channel;

#[derive(Debug, Clone, FromRow)]
pub struct UserPreferenceRow {
    pub id: String,
    pub user_id: String,
    pub channel: String,
    pub is_enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    pub id: String,
    pub user_id: String,
    pub channel: Channel,
    pub is_enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<UserPreferenceRow> for UserPreference {
    type Error = crate::error::AppError;

    fn try_from(row: UserPreferenceRow) -> Result<Self, Self::Error> {
        use std::str::FromStr;

        let channel = Channel::from_str(&row.channel).map_err(|_| {
            crate::error::AppError::Internal(anyhow::anyhow!("unknown channel in store: {}", row.channel))
        })?;

        Ok(UserPreference {
            id: row.id,
            user_id: row.user_id,
            channel,
            is_enabled: row.is_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Upsert input for `PUT /users/{id}/preferences`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetUserPreference {
    pub channel: Channel,
    pub is_enabled: bool,
}
