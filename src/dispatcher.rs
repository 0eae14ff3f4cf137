use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::channel::ChannelResolver;
use crate::db::models::device_token::DeviceToken;
use crate::db::models::notification::{Channel, CreateNotification, Notification, NotificationType, Priority};
use crate::db::repository::{DeviceTokenRepository, NotificationRepository};
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::queue::{ChannelQueue, QueueJob};

const MAX_TITLE_LEN: usize = 200;
const MAX_MESSAGE_LEN: usize = 10_000;

/// Request to dispatch a single notification type to a single user across
/// whichever channels the resolver allows (C6). One `DispatchRequest` can
/// fan out into several `Notification` rows, one per resolved channel
/// (or exactly one, if `channel` pins a specific target).
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub user_id: String,
    pub notification_type: NotificationType,
    /// Caller-supplied content, persisted literally on the notification row
    /// (§3, §4.6). An active template is applied as a delivery-time
    /// override by the worker; this is the fallback when none exists or
    /// rendering fails (§4.1, §4.5) — never itself the rendering input.
    pub title: String,
    pub message: String,
    pub variables: HashMap<String, String>,
    pub priority: Priority,
    pub scheduled_at: Option<chrono::NaiveDateTime>,
    /// Recipient hints the caller already has (e.g. `email`, `phone`),
    /// since there is no user directory in scope (§1) to look them up from.
    pub recipients: HashMap<Channel, String>,
    /// Pins the target channel, bypassing the type->default-channels
    /// mapping and the preference intersection entirely (§4.6 step 3).
    pub channel: Option<Channel>,
}

#[derive(Clone)]
pub struct Dispatcher {
    notifications: NotificationRepository,
    device_tokens: DeviceTokenRepository,
    resolver: ChannelResolver,
    queues: HashMap<Channel, ChannelQueue>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        notifications: NotificationRepository,
        device_tokens: DeviceTokenRepository,
        resolver: ChannelResolver,
        queues: HashMap<Channel, ChannelQueue>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            notifications,
            device_tokens,
            resolver,
            queues,
            metrics,
        }
    }

    /// Dispatch to every channel the resolver allows for this user/type,
    /// returning the persisted row for each one that was accepted. A
    /// channel with no deliverable recipient is skipped rather than failing
    /// the whole dispatch, matching the per-channel independence called out
    /// for bulk dispatch.
    pub async fn dispatch(&self, request: DispatchRequest) -> AppResult<Vec<Notification>> {
        if request.user_id.trim().is_empty() {
            return Err(AppError::InvalidArgument("user_id must not be empty".to_string()));
        }
        if request.title.trim().is_empty() {
            return Err(AppError::InvalidArgument("title must not be empty".to_string()));
        }
        if request.title.len() > MAX_TITLE_LEN {
            return Err(AppError::InvalidArgument(format!(
                "title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        if request.message.trim().is_empty() {
            return Err(AppError::InvalidArgument("message must not be empty".to_string()));
        }
        if request.message.len() > MAX_MESSAGE_LEN {
            return Err(AppError::InvalidArgument(format!(
                "message must be at most {MAX_MESSAGE_LEN} characters"
            )));
        }

        let channels = self
            .resolver
            .resolve(&request.user_id, request.notification_type, request.channel)
            .await?;
        let mut created = Vec::with_capacity(channels.len());

        for channel in channels {
            match self.dispatch_one(&request, channel).await {
                Ok(notification) => created.push(notification),
                Err(AppError::RecipientMissing(_)) => {
                    self.metrics.record_skipped_no_recipient();
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(created)
    }

    async fn dispatch_one(&self, request: &DispatchRequest, channel: Channel) -> AppResult<Notification> {
        let recipient = self.resolve_recipient(&request.user_id, channel, &request.recipients).await?;

        let mut metadata = request.variables.clone();
        metadata.insert("__recipient".to_string(), recipient);

        let notification = self
            .notifications
            .create(CreateNotification {
                user_id: request.user_id.clone(),
                notification_type: request.notification_type,
                channel,
                title: request.title.clone(),
                message: request.message.clone(),
                metadata,
                priority: request.priority,
                scheduled_at: request.scheduled_at,
            })
            .await?;

        let job = QueueJob::new(notification.id.clone(), channel, request.priority);
        let delay_millis = request
            .scheduled_at
            .map(|at| (at - Utc::now().naive_utc()).num_milliseconds().max(0))
            .unwrap_or(0);

        let queue = self
            .queues
            .get(&channel)
            .ok_or_else(|| AppError::QueueUnavailable(format!("no queue configured for channel {:?}", channel)))?;
        queue.push(&job, delay_millis).await?;
        self.metrics.record_enqueued(channel);

        Ok(notification)
    }

    /// Resolves a *single* recipient hint per channel for the notification
    /// record (`metadata["__recipient"]`). For push, this is the comma-
    /// joined set of every active device token; the worker fans out to each
    /// one individually at delivery time (§4.5).
    async fn resolve_recipient(
        &self,
        user_id: &str,
        channel: Channel,
        hints: &HashMap<Channel, String>,
    ) -> AppResult<String> {
        match channel {
            Channel::Email => hints
                .get(&Channel::Email)
                .cloned()
                .ok_or_else(|| AppError::RecipientMissing("no email address provided".to_string())),
            Channel::Sms => hints
                .get(&Channel::Sms)
                .cloned()
                .ok_or_else(|| AppError::RecipientMissing("no phone number provided".to_string())),
            Channel::Push => {
                let tokens: Vec<DeviceToken> = self.device_tokens.active_for_user(user_id).await?;
                if tokens.is_empty() {
                    return Err(AppError::RecipientMissing("no active device token".to_string()));
                }
                Ok(tokens.into_iter().map(|t| t.token).collect::<Vec<_>>().join(","))
            }
        }
    }

    /// Resubmits a terminally-FAILED notification as a brand new one,
    /// carrying the original id in metadata. Minting a new id (rather than
    /// resetting the existing row's status/retry_count in place) keeps the
    /// audit trail of the original failure intact. Pins the original
    /// channel, since a retry should not be re-routed through the default-
    /// channels mapping a second time.
    pub async fn retry_failed(&self, notification_id: &str) -> AppResult<Notification> {
        let original = self.notifications.find_by_id(notification_id).await?;

        let mut metadata = original.metadata.clone();
        metadata.insert("retried_from".to_string(), original.id.clone());
        let recipient = metadata.remove("__recipient").unwrap_or_default();

        let mut recipients = HashMap::new();
        recipients.insert(original.channel, recipient);

        self.dispatch(DispatchRequest {
            user_id: original.user_id,
            notification_type: original.notification_type,
            title: original.title,
            message: original.message,
            variables: metadata,
            priority: original.priority,
            scheduled_at: None,
            recipients,
            channel: Some(original.channel),
        })
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::InvalidArgument("retry produced no deliverable channel".to_string()))
    }
}
