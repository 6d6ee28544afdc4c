use serde::{Deserialize, Serialize};

use crate::models::PriceSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    TargetReached,
    PercentDrop,
    Restock,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::TargetReached => "target_reached",
            AlertKind::PercentDrop => "percent_drop",
            AlertKind::Restock => "restock",
        }
    }
}

/// A fired rule. Built by the evaluator and handed straight to the notifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub item_id: String,
    pub kind: AlertKind,
    pub sample: PriceSample,
    pub comparison: Option<PriceSample>,
    /// Target: amount below target. Percent drop: drop in percent. Restock: price change.
    pub delta: f64,
    /// Threshold that was crossed (target price or drop percentage).
    pub threshold: Option<f64>,
}
