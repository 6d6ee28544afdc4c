use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ItemConfig;
use crate::models::ProviderKind;
use crate::scheduler::parse_schedule;

/// How to read a price out of fetched content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExtractionRule {
    pub selector: Option<String>,
    pub attr: Option<String>,
    /// Cleanup pattern isolating the numeric substring.
    pub pattern: Option<String>,
    pub out_of_stock: Option<String>,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AlertThresholds {
    pub target_price: Option<f64>,
    /// Falls back to the global rule default when unset.
    pub percent_drop: Option<f64>,
}

/// An item as seen by one fetch cycle. Never mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedItem {
    pub id: String,
    pub name: String,
    pub url: String,
    pub provider: ProviderKind,
    pub command: Option<String>,
    pub rule: ExtractionRule,
    pub thresholds: AlertThresholds,
    /// How often the polling loop tracks this item; the loop interval when unset.
    pub schedule: Option<Duration>,
    pub retry_attempts: Option<u32>,
    pub cache_ttl: Option<Duration>,
}

impl TrackedItem {
    pub fn from_config(config: &ItemConfig, default_currency: &str) -> Self {
        let currency = config
            .currency
            .clone()
            .unwrap_or_else(|| default_currency.to_string())
            .to_ascii_uppercase();

        Self {
            id: config.id.clone(),
            name: if config.name.is_empty() {
                config.id.clone()
            } else {
                config.name.clone()
            },
            url: config.url.clone(),
            provider: config.provider,
            command: config.command.clone(),
            rule: ExtractionRule {
                selector: config.selector.clone(),
                attr: config.attr.clone().filter(|a| !a.is_empty()),
                pattern: config.regex.clone().filter(|p| !p.is_empty()),
                out_of_stock: config.out_of_stock.clone().filter(|p| !p.is_empty()),
                currency,
            },
            thresholds: AlertThresholds {
                target_price: config.target_price,
                percent_drop: config.percent_drop,
            },
            schedule: config
                .schedule
                .as_deref()
                .and_then(|s| parse_schedule(s).ok()),
            retry_attempts: config.retry_attempts,
            cache_ttl: config.cache_ttl_min.map(|m| Duration::from_secs(m * 60)),
        }
    }

    /// Request identity used as the response cache key.
    pub fn fingerprint(&self) -> String {
        let target = match self.provider {
            ProviderKind::Selector => self.url.as_str(),
            ProviderKind::Command => self.command.as_deref().unwrap_or_default(),
        };
        let rule = &self.rule;
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.provider,
            target,
            self.url,
            rule.selector.as_deref().unwrap_or_default(),
            rule.attr.as_deref().unwrap_or_default(),
            rule.pattern.as_deref().unwrap_or_default(),
            rule.out_of_stock.as_deref().unwrap_or_default(),
        )
    }

    /// Politeness key for the per-host concurrency cap.
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| format!("{}:{}", self.provider, self.id))
    }

    pub fn currency(&self) -> &str {
        &self.rule.currency
    }
}
