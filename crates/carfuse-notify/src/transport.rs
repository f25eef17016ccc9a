//! Channel transports — the delivery primitives behind the dispatcher.
//!
//! Email goes out over SMTP (lettre); SMS and push are JSON POSTs to their
//! respective gateways. Every failure maps to `CarFuseError::Delivery` and
//! is retryable up to the configured max attempts.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use carfuse_core::config::{GatewayConfig, SmtpConfig};
use carfuse_core::error::{CarFuseError, Result};
use carfuse_core::types::{ChannelKind, Recipient};

/// A channel-specific delivery primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    fn channel(&self) -> ChannelKind;

    /// Deliver rendered content to the recipient. `subject` is only
    /// meaningful for email; other channels may fold it into the body.
    async fn deliver(&self, recipient: &Recipient, subject: &str, content: &str) -> Result<()>;
}

/// Email transport over SMTP.
pub struct SmtpMailer {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| CarFuseError::Delivery(format!("SMTP relay: {e}")))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        let transport = builder.build();
        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Transport for SmtpMailer {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn deliver(&self, recipient: &Recipient, subject: &str, content: &str) -> Result<()> {
        let to = recipient
            .email
            .as_deref()
            .ok_or_else(|| CarFuseError::Delivery(format!("{}: no email address", recipient.id)))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| CarFuseError::Delivery(format!("bad email address {to}: {e}")))?;
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| CarFuseError::Delivery(format!("bad from address: {e}")))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .body(content.to_string())
            .map_err(|e| CarFuseError::Delivery(format!("build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| CarFuseError::Delivery(format!("SMTP send: {e}")))?;
        tracing::info!("✉️ Email sent to {}", recipient.id);
        Ok(())
    }
}

/// SMS transport — JSON POST to the configured gateway.
pub struct SmsTransport {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl SmsTransport {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for SmsTransport {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn deliver(&self, recipient: &Recipient, _subject: &str, content: &str) -> Result<()> {
        let phone = recipient
            .phone
            .as_deref()
            .ok_or_else(|| CarFuseError::Delivery(format!("{}: no phone number", recipient.id)))?;

        let resp = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "to": phone,
                "message": content,
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| CarFuseError::Delivery(format!("SMS gateway: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("📱 SMS sent to {}", recipient.id);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(CarFuseError::Delivery(format!(
                "SMS gateway error {status}: {body}"
            )))
        }
    }
}

/// Push transport — JSON POST to the configured push gateway.
pub struct PushTransport {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl PushTransport {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for PushTransport {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn deliver(&self, recipient: &Recipient, subject: &str, content: &str) -> Result<()> {
        let token = recipient.device_token.as_deref().ok_or_else(|| {
            CarFuseError::Delivery(format!("{}: no device token", recipient.id))
        })?;

        let resp = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "token": token,
                "title": subject,
                "body": content,
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| CarFuseError::Delivery(format!("push gateway: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("🔔 Push sent to {}", recipient.id);
            Ok(())
        } else {
            let status = resp.status();
            Err(CarFuseError::Delivery(format!(
                "push gateway error {status}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sms_requires_phone_number() {
        let transport = SmsTransport::new(GatewayConfig {
            url: "http://127.0.0.1:1".into(),
            api_key: String::new(),
        });
        let recipient = Recipient::new("u-1");
        let err = transport.deliver(&recipient, "", "hi").await.unwrap_err();
        assert!(err.to_string().contains("no phone number"));
    }

    #[tokio::test]
    async fn test_push_requires_device_token() {
        let transport = PushTransport::new(GatewayConfig::default());
        let recipient = Recipient::new("u-2");
        let err = transport.deliver(&recipient, "t", "b").await.unwrap_err();
        assert!(err.to_string().contains("no device token"));
    }
}
