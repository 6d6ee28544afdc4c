use crate::config::RulesConfig;
use crate::models::{AlertEvent, AlertKind, PriceSample, TrackedItem};

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSettings {
    /// Drop threshold in percent for items without their own.
    pub default_percent_drop: f64,
    pub restock: bool,
}

impl RuleSettings {
    pub fn from_config(rules: &RulesConfig) -> Self {
        Self {
            default_percent_drop: rules.percent_drop,
            restock: rules.restock,
        }
    }
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self::from_config(&RulesConfig::default())
    }
}

/// How many earlier samples the tracker hands to the evaluator.
pub const HISTORY_WINDOW: usize = 5;

/// Decides which alerts a freshly written sample triggers.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    settings: RuleSettings,
}

impl RuleEvaluator {
    pub fn new(settings: RuleSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    /// Evaluate every rule independently against `current`.
    ///
    /// `history` holds the samples written before `current`, newest first.
    /// Several alerts may fire for one sample.
    pub fn evaluate(
        &self,
        item: &TrackedItem,
        current: &PriceSample,
        history: &[PriceSample],
    ) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();
        let previous = history.first();
        let out_of_stock = current.in_stock() == Some(false);

        if out_of_stock {
            tracing::debug!(item = %item.id, "Out of stock, price rules suppressed");
        } else {
            if let Some(event) = self.target_reached(item, current, previous) {
                alerts.push(event);
            }
            if let Some(event) = self.percent_drop(item, current, previous) {
                alerts.push(event);
            }
        }

        if self.settings.restock {
            if let Some(event) = self.restock(item, current, history) {
                alerts.push(event);
            }
        }

        alerts
    }

    fn target_reached(
        &self,
        item: &TrackedItem,
        current: &PriceSample,
        previous: Option<&PriceSample>,
    ) -> Option<AlertEvent> {
        let target = item.thresholds.target_price?;
        if current.price > target {
            return None;
        }

        Some(AlertEvent {
            item_id: item.id.clone(),
            kind: AlertKind::TargetReached,
            sample: current.clone(),
            comparison: previous.cloned(),
            delta: target - current.price,
            threshold: Some(target),
        })
    }

    fn percent_drop(
        &self,
        item: &TrackedItem,
        current: &PriceSample,
        previous: Option<&PriceSample>,
    ) -> Option<AlertEvent> {
        let threshold = item
            .thresholds
            .percent_drop
            .unwrap_or(self.settings.default_percent_drop);
        if threshold <= 0.0 {
            return None;
        }

        let previous = previous?;
        if previous.price <= 0.0 {
            tracing::debug!(item = %item.id, "Previous price is zero, skipping drop check");
            return None;
        }
        if previous.currency != current.currency {
            tracing::debug!(
                item = %item.id,
                "Currency changed from {} to {}, skipping drop check",
                previous.currency,
                current.currency
            );
            return None;
        }

        let drop = (previous.price - current.price) * 100.0 / previous.price;
        if drop < threshold {
            return None;
        }

        Some(AlertEvent {
            item_id: item.id.clone(),
            kind: AlertKind::PercentDrop,
            sample: current.clone(),
            comparison: Some(previous.clone()),
            delta: drop,
            threshold: Some(threshold),
        })
    }

    fn restock(
        &self,
        item: &TrackedItem,
        current: &PriceSample,
        history: &[PriceSample],
    ) -> Option<AlertEvent> {
        if current.in_stock() != Some(true) {
            return None;
        }

        // Most recent earlier sample that recorded a stock state.
        let previous = history.iter().find(|s| s.in_stock().is_some())?;
        if previous.in_stock() != Some(false) {
            return None;
        }

        let delta = if previous.currency == current.currency {
            current.price - previous.price
        } else {
            0.0
        };

        Some(AlertEvent {
            item_id: item.id.clone(),
            kind: AlertKind::Restock,
            sample: current.clone(),
            comparison: Some(previous.clone()),
            delta,
            threshold: None,
        })
    }
}
