// Shared fixtures for the end-to-end tests.

pub mod config_tests;
pub mod pipeline_tests;
pub mod scheduler_tests;
pub mod storage_tests;

use std::sync::Arc;

use pricetrek::config::{AppConfig, ItemConfig, RetryConfig};
use pricetrek::models::{ProviderKind, TrackedItem};
use pricetrek::notify::Notifier;
use pricetrek::scheduler::ShutdownSignal;
use pricetrek::storage::SqliteStore;
use pricetrek::Tracker;

/// Fast retries so failing items do not slow the suite down.
pub fn test_config(items: Vec<ItemConfig>) -> AppConfig {
    let mut config = AppConfig::default();
    config.defaults.retry = RetryConfig {
        attempts: 3,
        base_delay_ms: 5,
        max_delay_ms: 20,
    };
    config.defaults.http_timeout_sec = 5;
    config.defaults.cache_ttl_min = 0;
    config.items = items;
    config
}

pub fn selector_item(id: &str, url: String) -> ItemConfig {
    ItemConfig {
        id: id.to_string(),
        name: format!("Item {}", id),
        url,
        provider: ProviderKind::Selector,
        selector: Some(".price".to_string()),
        attr: None,
        regex: None,
        out_of_stock: None,
        command: None,
        currency: Some("USD".to_string()),
        target_price: None,
        percent_drop: None,
        schedule: None,
        retry_attempts: None,
        cache_ttl_min: None,
    }
}

pub fn tracked_items(config: &AppConfig) -> Vec<TrackedItem> {
    config
        .items
        .iter()
        .map(|item| TrackedItem::from_config(item, &config.defaults.currency))
        .collect()
}

pub fn product_page(price: &str) -> String {
    format!(
        r#"<html><body><h1>Product</h1><span class="price">{}</span></body></html>"#,
        price
    )
}

pub async fn create_test_tracker(config: &AppConfig) -> anyhow::Result<(Arc<Tracker>, Arc<SqliteStore>)> {
    let store = Arc::new(SqliteStore::in_memory().await?);
    let tracker = Tracker::from_config(config, store.clone(), Notifier::empty(), ShutdownSignal::never()).await?;
    Ok((Arc::new(tracker), store))
}
