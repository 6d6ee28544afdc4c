use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{check_status, http_client, ALERT_TITLE};
use crate::plugins::traits::NotificationChannel;
use crate::utils::error::NotificationError;

/// Posts alerts to a Slack incoming webhook.
pub struct SlackNotifier {
    client: Client,
    webhook: String,
}

impl SlackNotifier {
    pub fn new(webhook: impl Into<String>) -> Result<Self, NotificationError> {
        let webhook = webhook.into();
        if !webhook.starts_with("http://") && !webhook.starts_with("https://") {
            return Err(NotificationError::Misconfigured(
                "slack webhook must be an http(s) URL".into(),
            ));
        }
        Ok(Self {
            client: http_client()?,
            webhook,
        })
    }

    fn payload(&self, message: &str) -> serde_json::Value {
        json!({
            "text": format!("🔔 *{}*\n{}", ALERT_TITLE, message),
        })
    }
}

#[async_trait]
impl NotificationChannel for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, message: &str) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.webhook)
            .json(&self.payload(message))
            .send()
            .await?;
        check_status(self.name(), &response)
    }
}
