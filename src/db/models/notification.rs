use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Upper bound on retry attempts before a notification is terminally FAILED.
pub const MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Welcome,
    PasswordReset,
    EmailVerification,
    OrderConfirmation,
    OrderShipped,
    OrderDelivered,
    PaymentSuccess,
    PaymentFailed,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "WELCOME",
            Self::PasswordReset => "PASSWORD_RESET",
            Self::EmailVerification => "EMAIL_VERIFICATION",
            Self::OrderConfirmation => "ORDER_CONFIRMATION",
            Self::OrderShipped => "ORDER_SHIPPED",
            Self::OrderDelivered => "ORDER_DELIVERED",
            Self::PaymentSuccess => "PAYMENT_SUCCESS",
            Self::PaymentFailed => "PAYMENT_FAILED",
        }
    }

    /// Type -> default channel set (§4.6), before intersecting with preferences.
    pub fn default_channels(&self) -> &'static [Channel] {
        match self {
            Self::Welcome => &[Channel::Email],
            Self::OrderConfirmation => &[Channel::Email, Channel::Push],
            Self::OrderShipped => &[Channel::Push, Channel::Sms],
            Self::OrderDelivered => &[Channel::Push],
            Self::PaymentSuccess => &[Channel::Email],
            Self::PaymentFailed => &[Channel::Email, Channel::Push],
            Self::PasswordReset => &[Channel::Email],
            Self::EmailVerification => &[Channel::Email],
        }
    }
}

impl std::str::FromStr for NotificationType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "WELCOME" => Self::Welcome,
            "PASSWORD_RESET" => Self::PasswordReset,
            "EMAIL_VERIFICATION" => Self::EmailVerification,
            "ORDER_CONFIRMATION" => Self::OrderConfirmation,
            "ORDER_SHIPPED" => Self::OrderShipped,
            "ORDER_DELIVERED" => Self::OrderDelivered,
            "PAYMENT_SUCCESS" => Self::PaymentSuccess,
            "PAYMENT_FAILED" => Self::PaymentFailed,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Email,
    Push,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Push => "PUSH",
            Self::Sms => "SMS",
        }
    }

    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Push => "push",
            Self::Sms => "sms",
        }
    }

    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Push, Channel::Sms];
}

impl std::str::FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "EMAIL" => Self::Email,
            "PUSH" => Self::Push,
            "SMS" => Self::Sms,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    /// Maps to the integer score used by the channel work queues (§4.4);
    /// higher wins on dequeue.
    pub fn weight(&self) -> i64 {
        match self {
            Self::Low => 1,
            Self::Normal => 5,
            Self::High => 10,
            Self::Urgent => 20,
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "LOW" => Self::Low,
            "NORMAL" => Self::Normal,
            "HIGH" => Self::High,
            "URGENT" => Self::Urgent,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Queued,
    Processing,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "QUEUED" => Self::Queued,
            "PROCESSING" => Self::Processing,
            "SENT" => Self::Sent,
            "FAILED" => Self::Failed,
            _ => return Err(()),
        })
    }
}

/// Row shape as stored (sqlx maps TEXT columns; typed enums are parsed at the
/// repository boundary rather than via `sqlx::Type`, so the store can reject
/// unrecognised values with a clear error instead of a derive panic).
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub notification_type: String,
    pub channel: String,
    pub title: String,
    pub message: String,
    pub metadata: Option<String>,
    pub priority: String,
    pub scheduled_at: Option<NaiveDateTime>,
    pub status: String,
    pub retry_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
    pub failed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
}

/// Domain-level view used everywhere outside the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub title: String,
    pub message: String,
    pub metadata: HashMap<String, String>,
    pub priority: Priority,
    pub scheduled_at: Option<NaiveDateTime>,
    pub status: NotificationStatus,
    pub retry_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
    pub failed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = crate::error::AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        use std::str::FromStr;

        let notification_type = NotificationType::from_str(&row.notification_type)
            .map_err(|_| crate::error::AppError::Internal(anyhow::anyhow!(
                "unknown notification_type in store: {}",
                row.notification_type
            )))?;
        let channel = Channel::from_str(&row.channel).map_err(|_| {
            crate::error::AppError::Internal(anyhow::anyhow!("unknown channel in store: {}", row.channel))
        })?;
        let priority = Priority::from_str(&row.priority).unwrap_or_default();
        let status = NotificationStatus::from_str(&row.status).map_err(|_| {
            crate::error::AppError::Internal(anyhow::anyhow!("unknown status in store: {}", row.status))
        })?;
        let metadata = match row.metadata {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            None => HashMap::new(),
        };

        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            notification_type,
            channel,
            title: row.title,
            message: row.message,
            metadata,
            priority,
            scheduled_at: row.scheduled_at,
            status,
            retry_count: row.retry_count as i32,
            created_at: row.created_at,
            updated_at: row.updated_at,
            sent_at: row.sent_at,
            failed_at: row.failed_at,
            error_message: row.error_message,
        })
    }
}

/// Input accepted by the dispatcher and the store's `create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub user_id: String,
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub priority: Priority,
    pub scheduled_at: Option<NaiveDateTime>,
}
