use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::SmtpConfig;
use crate::{AppError, Result};

/// Outbound alert channel. Invoked by the scrape cycle on a threshold
/// trigger; failures are logged by the caller, never escalated.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str, recipient: &str) -> Result<()>;
}

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl EmailNotifier {
    /// Build the SMTP transport up front. Missing credentials are a
    /// configuration error at startup, not a per-send surprise.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let username = config
            .username
            .clone()
            .ok_or_else(|| AppError::Validation("SMTP username is not set".to_string()))?;
        let password = config
            .password
            .clone()
            .ok_or_else(|| AppError::Validation("SMTP password is not set".to_string()))?;
        let from_address = config.from_address.clone().unwrap_or_else(|| username.clone());

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::Notify(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(username, password))
            .build();

        Ok(Self {
            transport,
            from: format!("{} <{}>", config.from_name, from_address),
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        let email = Message::builder()
            .from(self
                .from
                .parse()
                .map_err(|e| AppError::Notify(format!("Invalid from address: {e}")))?)
            .to(recipient
                .parse()
                .map_err(|e| AppError::Notify(format!("Invalid recipient: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Notify(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| AppError::Notify(e.to_string()))?;

        info!(recipient, subject, "alert email sent");
        Ok(())
    }
}

/// Fallback when no SMTP credentials are configured: logs the alert instead
/// of sending it, so a cycle can still run end to end.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        info!(recipient, subject, body, "price alert (email delivery not configured)");
        Ok(())
    }
}
