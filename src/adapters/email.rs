use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::db::models::notification::Channel;
use crate::error::{AppError, AppResult};

use super::{ChannelAdapter, OutboundMessage};

pub struct SmtpEmailAdapter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpEmailAdapter {
    pub fn new(
        relay_host: &str,
        username: &str,
        password: &str,
        from_address: String,
    ) -> AppResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(relay_host)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid SMTP relay {relay_host}: {e}")))?
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        Ok(Self { transport, from_address })
    }
}

#[async_trait]
impl ChannelAdapter for SmtpEmailAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> AppResult<()> {
        let builder = Message::builder()
            .from(self.from_address.parse().map_err(|e| {
                AppError::AdapterPermanent(format!("invalid from address {}: {e}", self.from_address))
            })?)
            .to(message
                .recipient
                .parse()
                .map_err(|e| AppError::RecipientMissing(format!("invalid email address: {e}")))?)
            .subject(message.subject.clone().unwrap_or_default());

        let email = if let Some(html) = &message.html_body {
            builder
                .multipart(lettre::message::MultiPart::alternative_plain_html(
                    message.body.clone(),
                    html.clone(),
                ))
                .map_err(|e| AppError::AdapterPermanent(format!("failed to build email body: {e}")))?
        } else {
            builder
                .body(message.body.clone())
                .map_err(|e| AppError::AdapterPermanent(format!("failed to build email body: {e}")))?
        };

        self.transport.send(email).await.map_err(|e| {
            if e.is_transient() {
                AppError::AdapterTransient(e.to_string())
            } else {
                AppError::AdapterPermanent(e.to_string())
            }
        })?;

        Ok(())
    }
}
