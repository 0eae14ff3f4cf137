use std::sync::Arc;

use crate::cache::TemplateCache;
use crate::db::models::notification::{Channel, NotificationType};
use crate::db::models::template::NotificationTemplate;
use crate::db::repository::{PreferenceRepository, TemplateRepository};
use crate::error::AppResult;

/// Resolves which channels a given notification type should fan out to for
/// a user, and fronts the active-template lookup the workers render against
/// (C2). Two read paths, both degrading gracefully on failure rather than
/// aborting the caller:
///
/// - `resolve`: intersects the type's default channel set with the user's
///   opt-outs, unless the caller pinned an explicit channel, in which case
///   the intersection is skipped entirely (§4.6 step 3).
/// - `get_template`: cache-first, store-on-miss; a missing template or a
///   read failure both degrade to `None` so a worker can fall back to the
///   notification's own literal title/message (§4.1, §4.5).
///
/// A disabled device-token set is not itself a reason to drop the push
/// channel here — delivery-time routing (no active token) surfaces as a
/// `RecipientMissing` error from the worker instead, so the notification
/// record still reflects an attempted send.
#[derive(Clone)]
pub struct ChannelResolver {
    preferences: PreferenceRepository,
    templates: TemplateRepository,
    cache: Arc<TemplateCache>,
}

impl ChannelResolver {
    pub fn new(preferences: PreferenceRepository, templates: TemplateRepository, cache: Arc<TemplateCache>) -> Self {
        Self {
            preferences,
            templates,
            cache,
        }
    }

    pub async fn resolve(
        &self,
        user_id: &str,
        notification_type: NotificationType,
        pinned_channel: Option<Channel>,
    ) -> AppResult<Vec<Channel>> {
        if let Some(channel) = pinned_channel {
            return Ok(vec![channel]);
        }

        let mut resolved = Vec::new();
        for channel in notification_type.default_channels() {
            if self.preferences.is_enabled(user_id, *channel).await? {
                resolved.push(*channel);
            }
        }
        Ok(resolved)
    }

    pub async fn get_template(&self, notification_type: NotificationType, channel: Channel) -> Option<NotificationTemplate> {
        self.cache
            .get_or_load(&self.templates, notification_type, channel)
            .await
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_defaults_to_email_only() {
        assert_eq!(NotificationType::Welcome.default_channels(), &[Channel::Email]);
    }

    #[test]
    fn order_shipped_defaults_to_push_and_sms() {
        assert_eq!(
            NotificationType::OrderShipped.default_channels(),
            &[Channel::Push, Channel::Sms]
        );
    }
}
