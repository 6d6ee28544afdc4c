use async_trait::async_trait;
use reqwest::Client;

use super::{check_status, http_client, ALERT_TITLE};
use crate::plugins::traits::NotificationChannel;
use crate::utils::error::NotificationError;

pub const DEFAULT_NTFY_SERVER: &str = "https://ntfy.sh";

/// Publishes alerts to an ntfy topic as plain text.
pub struct NtfyNotifier {
    client: Client,
    server: String,
    topic: String,
}

impl NtfyNotifier {
    pub fn new(server: impl Into<String>, topic: impl Into<String>) -> Result<Self, NotificationError> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(NotificationError::Misconfigured("ntfy topic not set".into()));
        }
        Ok(Self {
            client: http_client()?,
            server: server.into().trim_end_matches('/').to_string(),
            topic,
        })
    }

    pub fn topic_url(&self) -> String {
        format!("{}/{}", self.server, self.topic)
    }
}

#[async_trait]
impl NotificationChannel for NtfyNotifier {
    fn name(&self) -> &str {
        "ntfy"
    }

    async fn send(&self, message: &str) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(self.topic_url())
            .header("Title", ALERT_TITLE)
            .header("Priority", "default")
            .header("Tags", "price,alert")
            .body(message.to_string())
            .send()
            .await?;
        check_status(self.name(), &response)
    }
}
