use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::is_currency_code;

pub type SampleMeta = serde_json::Map<String, serde_json::Value>;

pub const IN_STOCK_KEY: &str = "in_stock";

/// One observation of an item's price. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub item_id: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub currency: String,
    #[serde(default)]
    pub meta: SampleMeta,
}

impl PriceSample {
    /// Stock flag recorded with the sample, if any.
    pub fn in_stock(&self) -> Option<bool> {
        self.meta.get(IN_STOCK_KEY).and_then(|v| v.as_bool())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    pub item_id: String,
    pub price: f64,
    pub currency: String,
    pub meta: SampleMeta,
}

impl NewSample {
    pub fn new(item_id: &str, price: f64, currency: &str, in_stock: bool) -> Self {
        let mut meta = SampleMeta::new();
        meta.insert(IN_STOCK_KEY.to_string(), in_stock.into());
        Self {
            item_id: item_id.to_string(),
            price,
            currency: currency.to_string(),
            meta,
        }
    }

    pub fn with_meta(mut self, extra: SampleMeta) -> Self {
        for (key, value) in extra {
            self.meta.entry(key).or_insert(value);
        }
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(format!("price must be positive, got {}", self.price));
        }
        if !is_currency_code(&self.currency) {
            return Err(format!("invalid currency code '{}'", self.currency));
        }
        Ok(())
    }

    pub fn into_sample(self, timestamp: DateTime<Utc>) -> PriceSample {
        PriceSample {
            item_id: self.item_id,
            timestamp,
            price: self.price,
            currency: self.currency,
            meta: self.meta,
        }
    }
}
