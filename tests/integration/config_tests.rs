use pricetrek::config::AppConfig;
use pricetrek::models::{ProviderKind, TrackedItem};
use std::io::Write;
use std::time::Duration;
use tempfile::Builder;

const SAMPLE_CONFIG: &str = r#"
storage:
  driver: sqlite
  path: ./data/test.db
defaults:
  currency: EUR
  retry:
    attempts: 4
rules:
  percent_drop: 12.5
notifications:
  slack:
    enabled: false
items:
  - id: kettle
    name: Kettle
    url: https://shop.example.com/kettle
    selector: ".price"
    target_price: 40
  - id: gpu
    provider: command
    command: fetch-price {url}
    currency: usd
    cache_ttl_min: 5
"#;

fn write_config(contents: &str) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut file = Builder::new().suffix(".yaml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn test_load_yaml_config() -> anyhow::Result<()> {
    let file = write_config(SAMPLE_CONFIG)?;
    let config = AppConfig::load(file.path())?;

    assert_eq!(config.storage.path, "./data/test.db");
    assert_eq!(config.defaults.retry.attempts, 4);
    assert_eq!(config.defaults.retry.base_delay_ms, 800);
    assert_eq!(config.rules.percent_drop, 12.5);
    assert_eq!(config.items.len(), 2);

    let kettle = TrackedItem::from_config(&config.items[0], &config.defaults.currency);
    assert_eq!(kettle.provider, ProviderKind::Selector);
    assert_eq!(kettle.currency(), "EUR");
    assert_eq!(kettle.thresholds.target_price, Some(40.0));

    let gpu = TrackedItem::from_config(&config.items[1], &config.defaults.currency);
    assert_eq!(gpu.provider, ProviderKind::Command);
    assert_eq!(gpu.currency(), "USD");
    assert_eq!(gpu.cache_ttl, Some(Duration::from_secs(300)));
    Ok(())
}

#[test]
fn test_duplicate_ids_are_rejected() -> anyhow::Result<()> {
    let file = write_config(
        r#"
items:
  - id: kettle
    url: https://shop.example.com/a
    selector: ".price"
  - id: kettle
    url: https://shop.example.com/b
    selector: ".price"
"#,
    )?;
    let err = AppConfig::load(file.path()).unwrap_err();
    assert!(err.to_string().contains("Duplicate item id"));
    Ok(())
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(AppConfig::load("/nonexistent/pricetrek.yaml").is_err());
}
