use async_trait::async_trait;

use crate::extraction::Extracted;
use crate::models::{ProviderKind, TrackedItem};
use crate::utils::error::{ExtractionError, ProviderError};

/// A source of raw price content for an item.
///
/// `fetch` is a single attempt. Timeouts, retries and caching are layered on
/// top by [`crate::resilience::ResilientFetcher`], so implementations stay
/// free of policy.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn fetch(&self, item: &TrackedItem) -> Result<String, ProviderError>;

    fn extract(&self, raw: &str, item: &TrackedItem) -> Result<Extracted, ExtractionError>;
}
