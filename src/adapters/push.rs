use async_trait::async_trait;
use reqwest::Client;

use crate::db::models::notification::Channel;
use crate::error::{AppError, AppResult};

use super::{ChannelAdapter, OutboundMessage};

/// Push-gateway adapter over a generic JSON HTTP endpoint (e.g. an FCM/APNs
/// proxy). The concrete gateway is an out-of-scope external collaborator
/// (§1); this hits whatever URL the deployment points it at.
pub struct HttpPushAdapter {
    client: Client,
    gateway_url: String,
    api_key: String,
}

impl HttpPushAdapter {
    pub fn new(client: Client, gateway_url: String, api_key: String) -> Self {
        Self {
            client,
            gateway_url,
            api_key,
        }
    }
}

#[async_trait]
impl ChannelAdapter for HttpPushAdapter {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, message: &OutboundMessage) -> AppResult<()> {
        if message.recipient.is_empty() {
            return Err(AppError::RecipientMissing("no device token on file".to_string()));
        }

        let response = self
            .client
            .post(&self.gateway_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "token": message.recipient,
                "title": message.subject,
                "body": message.body,
            }))
            .send()
            .await
            .map_err(|e| AppError::AdapterTransient(e.to_string()))?;

        if response.status().is_server_error() || response.status().as_u16() == 429 {
            return Err(AppError::AdapterTransient(format!(
                "push gateway returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(AppError::AdapterPermanent(format!(
                "push gateway returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
