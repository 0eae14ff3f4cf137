use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "IOS",
            Self::Android => "ANDROID",
            Self::Web => "WEB",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "IOS" => Self::Ios,
            "ANDROID" => Self::Android,
            "WEB" => Self::Web,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DeviceTokenRow {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub platform: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceToken {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub platform: Platform,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<DeviceTokenRow> for DeviceToken {
    type Error = crate::error::AppError;

    fn try_from(row: DeviceTokenRow) -> Result<Self, Self::Error> {
        use std::str::FromStr;

        let platform = Platform::from_str(&row.platform).map_err(|_| {
            crate::error::AppError::Internal(anyhow::anyhow!("unknown platform in store: {}", row.platform))
        })?;

        Ok(DeviceToken {
            id: row.id,
            user_id: row.user_id,
            token: row.token,
            platform,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDeviceToken {
    pub token: String,
    pub platform: Platform,
}
