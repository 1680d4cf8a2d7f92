pub mod templates;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

/// Messages the auth core knows how to send.
#[derive(Debug, Clone)]
pub enum Template {
    PasswordReset { token: String, reset_url: String },
}

/// Outbound mail. Implementations either deliver the message or report why not.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send(&self, to: &str, template: &Template) -> Result<(), String>;
}

pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpDispatcher {
    pub fn new(config: &SmtpConfig) -> Result<Self, String> {
        let creds = Credentials::new(config.user.clone(), config.pass.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| format!("SMTP error: {e}"))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl EmailDispatcher for SmtpDispatcher {
    async fn send(&self, to: &str, template: &Template) -> Result<(), String> {
        let rendered = templates::render(to, template);
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| format!("Invalid from address: {e}"))?,
            )
            .to(to.parse().map_err(|e| format!("Invalid to address: {e}"))?)
            .subject(rendered.subject)
            .header(ContentType::TEXT_HTML)
            .body(rendered.html)
            .map_err(|e| format!("Failed to build email: {e}"))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| format!("Failed to send email: {e}"))?;

        Ok(())
    }
}

/// Used when no SMTP server is configured: the message is written to the log
/// instead of being delivered.
pub struct LogDispatcher;

#[async_trait]
impl EmailDispatcher for LogDispatcher {
    async fn send(&self, to: &str, template: &Template) -> Result<(), String> {
        match template {
            Template::PasswordReset { reset_url, .. } => {
                tracing::warn!("SMTP not configured. Password reset link for {to}: {reset_url}");
            }
        }
        Ok(())
    }
}
