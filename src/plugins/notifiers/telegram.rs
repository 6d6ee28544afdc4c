use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{check_status, http_client};
use crate::plugins::traits::NotificationChannel;
use crate::utils::error::NotificationError;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Sends alerts through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, NotificationError> {
        let token = token.into();
        let chat_id = chat_id.into();
        if token.is_empty() {
            return Err(NotificationError::Misconfigured("telegram bot token not set".into()));
        }
        if chat_id.is_empty() {
            return Err(NotificationError::Misconfigured("telegram chat_id not set".into()));
        }
        Ok(Self {
            client: http_client()?,
            api_base: TELEGRAM_API.to_string(),
            token,
            chat_id,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[async_trait]
impl NotificationChannel for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &str) -> Result<(), NotificationError> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": message,
            "disable_web_page_preview": false
        });

        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await?;
        check_status(self.name(), &response)
    }
}
