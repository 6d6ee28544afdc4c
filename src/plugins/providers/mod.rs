pub mod command;
pub mod selector;

pub use command::CommandProvider;
pub use selector::SelectorProvider;

use std::time::Duration;

use crate::config::DefaultsConfig;

/// Settings shared by every provider, taken from the `defaults` section.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub user_agent: String,
    /// Upper bound for a single request. The resilience layer applies its own
    /// per-attempt timeout on top of this.
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn from_defaults(defaults: &DefaultsConfig) -> Self {
        Self {
            user_agent: defaults.user_agent.clone(),
            timeout: defaults.http_timeout(),
        }
    }
}
