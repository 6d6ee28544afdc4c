// Notification channel implementations
pub mod email;
pub mod ntfy;
pub mod slack;
pub mod telegram;

pub use email::{EmailNotifier, EmailSettings};
pub use ntfy::NtfyNotifier;
pub use slack::SlackNotifier;
pub use telegram::TelegramNotifier;

use reqwest::Client;
use std::time::Duration;

use crate::utils::error::NotificationError;

pub const ALERT_TITLE: &str = "PriceTrek Alert";

const CHANNEL_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn http_client() -> Result<Client, NotificationError> {
    Ok(Client::builder().timeout(CHANNEL_TIMEOUT).build()?)
}

pub(crate) fn check_status(
    channel: &str,
    response: &reqwest::Response,
) -> Result<(), NotificationError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(NotificationError::Status {
            channel: channel.to_string(),
            status: status.as_u16(),
        })
    }
}
