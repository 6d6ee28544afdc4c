use crate::config::NotificationsConfig;
use crate::models::{AlertEvent, AlertKind, TrackedItem};
use crate::plugins::notifiers::email::DEFAULT_SMTP_PORT;
use crate::plugins::notifiers::ntfy::DEFAULT_NTFY_SERVER;
use crate::plugins::notifiers::{
    EmailNotifier, EmailSettings, NtfyNotifier, SlackNotifier, TelegramNotifier,
};
use crate::plugins::NotificationChannel;
use crate::utils::error::NotificationError;

pub const ENV_TELEGRAM_TOKEN: &str = "PRICETREK_TELEGRAM_TOKEN";
pub const ENV_SLACK_WEBHOOK: &str = "PRICETREK_SLACK_WEBHOOK";
pub const ENV_NTFY_URL: &str = "PRICETREK_NTFY_URL";
pub const ENV_EMAIL_SMTP: &str = "PRICETREK_EMAIL_SMTP";
pub const ENV_EMAIL_PORT: &str = "PRICETREK_EMAIL_PORT";
pub const ENV_EMAIL_USER: &str = "PRICETREK_EMAIL_USER";
pub const ENV_EMAIL_PASS: &str = "PRICETREK_EMAIL_PASS";

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed
    }

    pub fn merge(&mut self, other: DeliveryReport) {
        self.attempted += other.attempted;
        self.failed += other.failed;
    }
}

/// Best-effort delivery of alert messages to every enabled channel.
pub struct Notifier {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Build the enabled channels, reading secrets from the process environment
    /// when the configuration leaves them out.
    pub fn from_config(config: &NotificationsConfig) -> Self {
        Self::from_config_with_env(config, |key| std::env::var(key).ok())
    }

    /// Like [`Notifier::from_config`] with an explicit environment lookup.
    /// A misconfigured channel is logged and left out.
    pub fn from_config_with_env<F>(config: &NotificationsConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        let mut add = |name: &str, result: Result<Box<dyn NotificationChannel>, NotificationError>| {
            match result {
                Ok(channel) => channels.push(channel),
                Err(e) => tracing::warn!(channel = name, "Notification channel disabled: {}", e),
            }
        };

        if config.email.enabled {
            let email = &config.email;
            let port = email
                .smtp_port
                .or_else(|| env(ENV_EMAIL_PORT).and_then(|p| p.parse().ok()))
                .unwrap_or(DEFAULT_SMTP_PORT);
            let settings = EmailSettings {
                from: email.from.clone(),
                to: email.to.clone(),
                smtp_host: email
                    .smtp_host
                    .clone()
                    .or_else(|| env(ENV_EMAIL_SMTP))
                    .unwrap_or_default(),
                smtp_port: port,
                username: email.username.clone().or_else(|| env(ENV_EMAIL_USER)),
                password: email.password.clone().or_else(|| env(ENV_EMAIL_PASS)),
            };
            add(
                "email",
                EmailNotifier::new(settings).map(|n| Box::new(n) as Box<dyn NotificationChannel>),
            );
        }

        if config.telegram.enabled {
            let token = config
                .telegram
                .token
                .clone()
                .or_else(|| env(ENV_TELEGRAM_TOKEN))
                .unwrap_or_default();
            add(
                "telegram",
                TelegramNotifier::new(token, config.telegram.chat_id.clone())
                    .map(|n| Box::new(n) as Box<dyn NotificationChannel>),
            );
        }

        if config.slack.enabled {
            let webhook = Some(config.slack.webhook.clone())
                .filter(|w| !w.is_empty())
                .or_else(|| env(ENV_SLACK_WEBHOOK))
                .unwrap_or_default();
            add(
                "slack",
                SlackNotifier::new(webhook).map(|n| Box::new(n) as Box<dyn NotificationChannel>),
            );
        }

        if config.ntfy.enabled {
            let server = config
                .ntfy
                .server
                .clone()
                .or_else(|| env(ENV_NTFY_URL))
                .unwrap_or_else(|| DEFAULT_NTFY_SERVER.to_string());
            add(
                "ntfy",
                NtfyNotifier::new(server, config.ntfy.topic.clone())
                    .map(|n| Box::new(n) as Box<dyn NotificationChannel>),
            );
        }

        Self { channels }
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Attempt delivery on every channel. Failures are logged and counted,
    /// never returned.
    pub async fn send(&self, message: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for channel in &self.channels {
            report.attempted += 1;
            match channel.send(message).await {
                Ok(()) => tracing::debug!(channel = channel.name(), "Notification delivered"),
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!(
                        "pricetrek_notification_failures_total",
                        "channel" => channel.name().to_string()
                    )
                    .increment(1);
                    tracing::warn!(channel = channel.name(), "Failed to send notification: {}", e);
                }
            }
        }

        if report.failed > 0 {
            tracing::warn!(
                "Delivered to {} of {} channel(s)",
                report.delivered(),
                report.attempted
            );
        }
        report
    }

    pub async fn notify(&self, event: &AlertEvent, item: &TrackedItem) -> DeliveryReport {
        self.send(&format_alert(event, item)).await
    }
}

pub fn currency_symbol(code: &str) -> Option<&'static str> {
    match code {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "TRY" => Some("₺"),
        "JPY" => Some("¥"),
        "INR" => Some("₹"),
        _ => None,
    }
}

pub fn format_price(amount: f64, currency: &str) -> String {
    match currency_symbol(currency) {
        Some(symbol) => format!("{}{:.2}", symbol, amount),
        None => format!("{:.2} {}", amount, currency),
    }
}

/// Render an alert as a plain message. The text depends only on the event,
/// so identical events produce identical messages.
pub fn format_alert(event: &AlertEvent, item: &TrackedItem) -> String {
    let sample = &event.sample;
    let now = format_price(sample.price, &sample.currency);

    let mut message = match event.kind {
        AlertKind::TargetReached => {
            let target = event.threshold.unwrap_or(sample.price);
            format!(
                "🎯 {}: target price reached\nNow: {} (target {}, {} below)",
                item.name,
                now,
                format_price(target, &sample.currency),
                format_price(event.delta, &sample.currency),
            )
        }
        AlertKind::PercentDrop => {
            let was = event
                .comparison
                .as_ref()
                .map(|prev| format_price(prev.price, &prev.currency))
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "📉 {}: price dropped {:.1}%\nNow: {} (was {})",
                item.name, event.delta, now, was
            )
        }
        AlertKind::Restock => format!("📦 {}: back in stock\nNow: {}", item.name, now),
    };

    if !item.url.is_empty() {
        message.push('\n');
        message.push_str(&item.url);
    }
    message
}
