use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::ALERT_TITLE;
use crate::plugins::traits::NotificationChannel;
use crate::utils::error::NotificationError;

pub const DEFAULT_SMTP_PORT: u16 = 587;
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub from: String,
    pub to: Vec<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Sends alerts as plain-text mail over SMTP.
pub struct EmailNotifier {
    settings: EmailSettings,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotificationError::Misconfigured(format!("invalid address '{}': {}", address, e)))
}

impl EmailNotifier {
    pub fn new(settings: EmailSettings) -> Result<Self, NotificationError> {
        if settings.smtp_host.is_empty() {
            return Err(NotificationError::Misconfigured("SMTP host not set".into()));
        }
        if settings.to.is_empty() {
            return Err(NotificationError::Misconfigured("no email recipients".into()));
        }

        let from = parse_mailbox(&settings.from)?;
        let to = settings
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { settings, from, to })
    }

    pub fn build_message(&self, message: &str) -> Result<Message, NotificationError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(ALERT_TITLE);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .map_err(|e| NotificationError::Smtp(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotificationError> {
        let host = self.settings.smtp_host.as_str();
        let relay = if self.settings.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        };
        let builder = relay
            .map_err(|e| NotificationError::Smtp(e.to_string()))?
            .port(self.settings.smtp_port);

        let builder = match (&self.settings.username, &self.settings.password) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl NotificationChannel for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, message: &str) -> Result<(), NotificationError> {
        let email = self.build_message(message)?;
        let mailer = self.transport()?;

        mailer
            .send(email)
            .await
            .map_err(|e| NotificationError::Smtp(e.to_string()))?;

        tracing::debug!("Email sent to {} recipient(s)", self.to.len());
        Ok(())
    }
}
