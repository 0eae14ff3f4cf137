use async_trait::async_trait;
use reqwest::Client;

use crate::db::models::notification::Channel;
use crate::error::{AppError, AppResult};

use super::{ChannelAdapter, OutboundMessage};

/// SMS-gateway adapter over a generic JSON HTTP endpoint (e.g. a Twilio-like
/// provider). As with push, the concrete gateway is out-of-scope (§1).
pub struct HttpSmsAdapter {
    client: Client,
    gateway_url: String,
    api_key: String,
    from_number: String,
}

impl HttpSmsAdapter {
    pub fn new(client: Client, gateway_url: String, api_key: String, from_number: String) -> Self {
        Self {
            client,
            gateway_url,
            api_key,
            from_number,
        }
    }
}

#[async_trait]
impl ChannelAdapter for HttpSmsAdapter {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, message: &OutboundMessage) -> AppResult<()> {
        if message.recipient.is_empty() {
            return Err(AppError::RecipientMissing("no phone number on file".to_string()));
        }

        let response = self
            .client
            .post(&self.gateway_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from_number,
                "to": message.recipient,
                "body": message.body,
            }))
            .send()
            .await
            .map_err(|e| AppError::AdapterTransient(e.to_string()))?;

        if response.status().is_server_error() || response.status().as_u16() == 429 {
            return Err(AppError::AdapterTransient(format!(
                "sms gateway returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(AppError::AdapterPermanent(format!(
                "sms gateway returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
