use serde::{Deserialize, Serialize};

pub mod alert;
pub mod item;
pub mod price_sample;

// Re-exports for convenience
pub use alert::*;
pub use item::*;
pub use price_sample::*;

/// How a price is obtained for an item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// HTTP GET plus CSS selection.
    #[default]
    #[serde(alias = "generic", alias = "css")]
    Selector,
    /// External process printing a JSON record.
    Command,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Selector => "selector",
            ProviderKind::Command => "command",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
