pub mod email;
pub mod push;
pub mod sms;

use async_trait::async_trait;

use crate::db::models::notification::Channel;
use crate::error::AppResult;

/// A rendered message ready to hand to a channel's transport.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub html_body: Option<String>,
}

/// Delivery transport for a single channel. Real delivery integrations
/// (SMTP relay, push gateway, SMS gateway) are external collaborators the
/// dispatcher treats as out-of-scope to *implement fully*, but the seam
/// itself — this trait — is load-bearing, so each channel gets a working
/// implementation rather than a no-op.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> Channel;
    async fn send(&self, message: &OutboundMessage) -> AppResult<()>;
}

pub use email::SmtpEmailAdapter;
pub use push::HttpPushAdapter;
pub use sms::HttpSmsAdapter;
