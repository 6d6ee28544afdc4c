use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::providers::{CommandProvider, ProviderSettings, SelectorProvider};
use super::traits::PriceProvider;
use crate::models::ProviderKind;
use crate::utils::error::ProviderError;

pub type ProviderHandle = Arc<dyn PriceProvider>;

/// Providers keyed by kind; an item's `provider` field selects one at fetch time.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<ProviderKind, ProviderHandle>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry with the built-in selector and command providers.
    pub async fn with_defaults(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let registry = Self::new();
        registry
            .register(Arc::new(SelectorProvider::new(settings)?))
            .await;
        registry.register(Arc::new(CommandProvider::new())).await;
        Ok(registry)
    }

    /// Register a provider, replacing any previous one of the same kind.
    pub async fn register(&self, provider: ProviderHandle) {
        let kind = provider.kind();
        let mut providers = self.providers.write().await;
        if providers.insert(kind, provider).is_some() {
            tracing::debug!("Replaced provider {}", kind);
        }
    }

    pub async fn get(&self, kind: ProviderKind) -> Option<ProviderHandle> {
        let providers = self.providers.read().await;
        providers.get(&kind).cloned()
    }

    pub async fn has_provider(&self, kind: ProviderKind) -> bool {
        let providers = self.providers.read().await;
        providers.contains_key(&kind)
    }

    pub async fn list_kinds(&self) -> Vec<ProviderKind> {
        let providers = self.providers.read().await;
        providers.keys().copied().collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
