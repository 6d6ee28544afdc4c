use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use url::Url;
use validator::Validate;

use crate::models::ProviderKind;
use crate::scheduler::parse_schedule;

pub const DEFAULT_CONFIG_PATH: &str = "pricetrek.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_http_timeout_sec")]
    pub http_timeout_sec: u64,
    #[serde(default = "default_cache_ttl_min")]
    pub cache_ttl_min: u64,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            user_agent: default_user_agent(),
            retry: RetryConfig::default(),
            http_timeout_sec: default_http_timeout_sec(),
            cache_ttl_min: default_cache_ttl_min(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

impl DefaultsConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_sec)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_min * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Items fetched at the same time by `track_all`.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// In-flight fetches allowed against a single host.
    #[serde(default = "default_per_host")]
    pub per_host: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            per_host: default_per_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_percent_drop")]
    pub percent_drop: f64,
    #[serde(default = "default_true")]
    pub restock: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            percent_drop: default_percent_drop(),
            restock: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub ntfy: NtfyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub chat_id: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NtfyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub topic: String,
    pub server: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ItemConfig {
    #[validate(length(min = 1, message = "item id must not be empty"))]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub provider: ProviderKind,
    pub selector: Option<String>,
    pub attr: Option<String>,
    pub regex: Option<String>,
    /// Case-insensitive pattern that marks the page as out of stock.
    pub out_of_stock: Option<String>,
    pub command: Option<String>,
    pub currency: Option<String>,
    #[validate(range(min = 0.0, message = "target_price must not be negative"))]
    pub target_price: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0, message = "percent_drop must be within 0..=100"))]
    pub percent_drop: Option<f64>,
    pub schedule: Option<String>,
    #[validate(range(min = 1, message = "retry_attempts must be at least 1"))]
    pub retry_attempts: Option<u32>,
    pub cache_ttl_min: Option<u64>,
}

impl AppConfig {
    /// Load configuration from a YAML file, layered with `PRICETREK__*` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Message(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let s = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("PRICETREK").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.driver != "sqlite" {
            return Err(ConfigError::Message(format!(
                "Unsupported storage driver: {}",
                self.storage.driver
            )));
        }

        if !is_currency_code(&self.defaults.currency) {
            return Err(ConfigError::Message(
                "Default currency must be a three-letter code".into(),
            ));
        }

        let retry = &self.defaults.retry;
        if retry.attempts == 0 {
            return Err(ConfigError::Message("Retry attempts must be greater than 0".into()));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::Message(
                "Retry base_delay_ms cannot exceed max_delay_ms".into(),
            ));
        }

        if self.defaults.http_timeout_sec == 0 {
            return Err(ConfigError::Message("HTTP timeout must be greater than 0".into()));
        }

        if self.defaults.concurrency.workers == 0 || self.defaults.concurrency.per_host == 0 {
            return Err(ConfigError::Message(
                "Concurrency workers and per_host must be greater than 0".into(),
            ));
        }

        if self.rules.percent_drop < 0.0 {
            return Err(ConfigError::Message("Rules percent_drop must not be negative".into()));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if !seen.insert(item.id.as_str()) {
                return Err(ConfigError::Message(format!("Duplicate item id: {}", item.id)));
            }
            validate_item(item)?;
        }

        Ok(())
    }

    pub fn find_item(&self, id: &str) -> Option<&ItemConfig> {
        self.items.iter().find(|item| item.id == id)
    }
}

fn validate_item(item: &ItemConfig) -> Result<(), ConfigError> {
    item.validate()
        .map_err(|e| ConfigError::Message(format!("Item {}: {}", item.id, e)))?;

    if let Some(currency) = &item.currency {
        if !is_currency_code(currency) {
            return Err(ConfigError::Message(format!(
                "Item {}: currency must be a three-letter code",
                item.id
            )));
        }
    }

    if let Some(schedule) = &item.schedule {
        parse_schedule(schedule)
            .map_err(|e| ConfigError::Message(format!("Item {}: invalid schedule: {}", item.id, e)))?;
    }

    match item.provider {
        ProviderKind::Selector => {
            if Url::parse(&item.url).is_err() {
                return Err(ConfigError::Message(format!("Item {}: invalid URL format", item.id)));
            }
            if item.selector.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(ConfigError::Message(format!(
                    "Item {}: selector provider requires a selector",
                    item.id
                )));
            }
        }
        ProviderKind::Command => {
            if item.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                return Err(ConfigError::Message(format!(
                    "Item {}: command provider requires a command",
                    item.id
                )));
            }
        }
    }

    Ok(())
}

pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

fn default_driver() -> String {
    "sqlite".to_string()
}

fn default_storage_path() -> String {
    "./data/trek.db".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_user_agent() -> String {
    format!("PriceTrek/{}", env!("CARGO_PKG_VERSION"))
}

fn default_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    800
}

fn default_max_delay_ms() -> u64 {
    7_000
}

fn default_http_timeout_sec() -> u64 {
    20
}

fn default_cache_ttl_min() -> u64 {
    30
}

fn default_workers() -> usize {
    4
}

fn default_per_host() -> usize {
    2
}

fn default_percent_drop() -> f64 {
    8.0
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn selector_item(id: &str) -> ItemConfig {
        ItemConfig {
            id: id.to_string(),
            name: "Headphones".to_string(),
            url: "https://shop.example.com/p/1".to_string(),
            provider: ProviderKind::Selector,
            selector: Some(".price".to_string()),
            attr: None,
            regex: None,
            out_of_stock: None,
            command: None,
            currency: Some("EUR".to_string()),
            target_price: Some(250.0),
            percent_drop: None,
            schedule: None,
            retry_attempts: None,
            cache_ttl_min: None,
        }
    }

    fn valid_config() -> AppConfig {
        AppConfig {
            items: vec![selector_item("headphones")],
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_defaults_match_original_values() {
        let config = AppConfig::default();
        assert_eq!(config.storage.path, "./data/trek.db");
        assert_eq!(config.defaults.retry.attempts, 3);
        assert_eq!(config.defaults.retry.base_delay_ms, 800);
        assert_eq!(config.defaults.retry.max_delay_ms, 7_000);
        assert_eq!(config.defaults.http_timeout(), Duration::from_secs(20));
        assert_eq!(config.defaults.cache_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(config.rules.percent_drop, 8.0);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_attempts() {
        let mut config = valid_config();
        config.defaults.retry.attempts = 0;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("attempts must be greater than 0"));
    }

    #[test]
    fn test_config_validation_base_delay_above_max() {
        let mut config = valid_config();
        config.defaults.retry.base_delay_ms = 10_000;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("cannot exceed max_delay_ms"));
    }

    #[test]
    fn test_config_validation_duplicate_ids() {
        let mut config = valid_config();
        config.items.push(selector_item("headphones"));

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Duplicate item id"));
    }

    #[test]
    fn test_config_validation_invalid_url() {
        let mut config = valid_config();
        config.items[0].url = "not-a-url".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("invalid URL"));
    }

    #[test]
    fn test_config_validation_bad_currency() {
        let mut config = valid_config();
        config.items[0].currency = Some("EURO".to_string());

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("three-letter"));
    }

    #[test]
    fn test_config_validation_command_requires_command() {
        let mut config = valid_config();
        config.items[0].provider = ProviderKind::Command;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("requires a command"));
    }

    #[test]
    fn test_config_validation_schedule() {
        let mut config = valid_config();
        config.items[0].schedule = Some("@daily".to_string());
        assert!(config.validate().is_ok());

        config.items[0].schedule = Some("0 * * * *".to_string());
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("invalid schedule"));
    }

    #[test]
    fn test_config_validation_negative_threshold() {
        let mut config = valid_config();
        config.items[0].percent_drop = Some(-5.0);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
storage:
  path: /tmp/trek-test.db
defaults:
  currency: TRY
  retry:
    attempts: 5
rules:
  percent_drop: 10
items:
  - id: kettle
    name: Kettle
    url: https://shop.example.com/kettle
    provider: generic
    selector: span.price
    regex: "([0-9.,]+)"
    currency: TRY
    target_price: 900
  - id: console
    name: Console
    url: https://shop.example.com/console
    provider: command
    command: ./fetch-price {{url}}
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.defaults.currency, "TRY");
        assert_eq!(config.defaults.retry.attempts, 5);
        assert_eq!(config.defaults.retry.base_delay_ms, 800);
        assert_eq!(config.rules.percent_drop, 10.0);
        assert_eq!(config.items.len(), 2);
        assert_eq!(config.items[0].provider, ProviderKind::Selector);
        assert_eq!(config.items[1].provider, ProviderKind::Command);
        assert_eq!(config.find_item("kettle").unwrap().target_price, Some(900.0));
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load("/nonexistent/pricetrek.yaml");
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
