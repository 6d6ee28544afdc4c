use async_trait::async_trait;

use crate::utils::error::NotificationError;

/// One delivery transport (Slack, Telegram, ntfy, email).
///
/// Receives a message already formatted by [`crate::notify::format_alert`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &str) -> Result<(), NotificationError>;
}
