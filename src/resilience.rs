use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_retry::RetryIf;

use crate::config::DefaultsConfig;
use crate::extraction::Extracted;
use crate::models::TrackedItem;
use crate::plugins::ProviderRegistry;
use crate::scheduler::ShutdownSignal;
use crate::utils::error::{ExtractionError, FetchError, ProviderError};

/// Retry, timeout and cache parameters for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ResiliencePolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl ResiliencePolicy {
    pub fn from_defaults(defaults: &DefaultsConfig) -> Self {
        Self {
            attempts: defaults.retry.attempts.max(1),
            base_delay: Duration::from_millis(defaults.retry.base_delay_ms),
            max_delay: Duration::from_millis(defaults.retry.max_delay_ms),
            timeout: defaults.http_timeout(),
            cache_ttl: defaults.cache_ttl(),
        }
    }

    /// Apply the item's `retry_attempts` and `cache_ttl_min` overrides.
    pub fn for_item(&self, item: &TrackedItem) -> Self {
        let mut policy = self.clone();
        if let Some(attempts) = item.retry_attempts {
            policy.attempts = attempts.max(1);
        }
        if let Some(ttl) = item.cache_ttl {
            policy.cache_ttl = ttl;
        }
        policy
    }

    pub fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::new(self.base_delay, self.max_delay, self.attempts)
    }
}

/// Delays between attempts: before attempt `n` (n >= 2) the wait is
/// `min(max, base * 2^(n-2)) + uniform(0, base)`.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    base: Duration,
    max: Duration,
    next_attempt: u32,
    attempts: u32,
}

impl BackoffSchedule {
    pub fn new(base: Duration, max: Duration, attempts: u32) -> Self {
        Self {
            base,
            max,
            next_attempt: 2,
            attempts,
        }
    }

    /// The deterministic part of the delay before `attempt`.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }

    fn jitter(&self) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        if base_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=base_ms))
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next_attempt > self.attempts {
            return None;
        }
        let delay = self.capped_delay(self.next_attempt) + self.jitter();
        self.next_attempt += 1;
        Some(delay)
    }
}

struct CacheEntry {
    raw: String,
    expires_at: Instant,
}

/// Raw provider content keyed by request fingerprint.
///
/// Expired entries are evicted lazily on lookup.
#[derive(Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => return Some(entry.raw.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(key);
        }
        None
    }

    /// Store content for `ttl`. A zero TTL disables caching for the entry.
    pub async fn put(&self, key: &str, raw: String, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                raw,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Skip the cache lookup. The fresh result is still written back.
    pub force_refresh: bool,
}

/// Result of a successful fetch-and-extract.
#[derive(Debug, Clone)]
pub struct FetchedSample {
    pub extracted: Extracted,
    pub from_cache: bool,
    pub attempts: u32,
}

enum AttemptError {
    Provider(ProviderError),
    Extraction(ExtractionError),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Provider(err) => err.is_retryable(),
            AttemptError::Extraction(_) => false,
        }
    }
}

/// Wraps every provider fetch with timeouts, jittered retries and a TTL response cache.
pub struct ResilientFetcher {
    registry: ProviderRegistry,
    cache: Arc<ResponseCache>,
    policy: ResiliencePolicy,
    shutdown: ShutdownSignal,
}

impl ResilientFetcher {
    pub fn new(
        registry: ProviderRegistry,
        cache: Arc<ResponseCache>,
        policy: ResiliencePolicy,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            registry,
            cache,
            policy,
            shutdown,
        }
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Obtain and extract a price for `item`.
    ///
    /// Cache first (unless `force_refresh`), then up to `attempts` provider
    /// calls. Retryable provider failures back off and try again; extraction
    /// failures return at once. Content is cached only once it extracted
    /// cleanly.
    pub async fn fetch_sample(
        &self,
        item: &TrackedItem,
        options: FetchOptions,
    ) -> Result<FetchedSample, FetchError> {
        if self.shutdown.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let provider = self.registry.get(item.provider).await.ok_or_else(|| {
            FetchError::Provider(ProviderError::InvalidTarget(format!(
                "no provider registered for kind {}",
                item.provider
            )))
        })?;

        let policy = self.policy.for_item(item);
        let key = item.fingerprint();

        if !options.force_refresh {
            if let Some(raw) = self.cache.get(&key).await {
                metrics::counter!("pricetrek_cache_hits_total").increment(1);
                tracing::debug!(item = %item.id, "Cache hit");
                let extracted = provider.extract(&raw, item)?;
                return Ok(FetchedSample {
                    extracted,
                    from_cache: true,
                    attempts: 0,
                });
            }
        }

        let mut attempt = 0u32;
        let action = || {
            attempt += 1;
            let current = attempt;
            let provider = provider.clone();
            let timeout = policy.timeout;
            async move {
                metrics::counter!("pricetrek_fetch_attempts_total", "provider" => item.provider.as_str())
                    .increment(1);
                tracing::debug!(item = %item.id, attempt = current, "Fetching");

                let raw = match tokio::time::timeout(timeout, provider.fetch(item)).await {
                    Ok(result) => result.map_err(AttemptError::Provider)?,
                    Err(_) => return Err(AttemptError::Provider(ProviderError::Timeout(timeout))),
                };
                let extracted = provider
                    .extract(&raw, item)
                    .map_err(AttemptError::Extraction)?;
                Ok::<_, AttemptError>((raw, extracted, current))
            }
        };

        let condition = |err: &AttemptError| {
            let retryable = err.is_retryable();
            if let AttemptError::Provider(cause) = err {
                tracing::warn!(item = %item.id, retryable, "Fetch attempt failed: {}", cause);
            }
            retryable
        };

        let retried = RetryIf::start(policy.backoff(), action, condition);

        let outcome = tokio::select! {
            result = retried => result,
            _ = self.shutdown.cancelled() => {
                tracing::info!(item = %item.id, "Fetch cancelled");
                return Err(FetchError::Cancelled);
            }
        };

        match outcome {
            Ok((raw, extracted, attempts)) => {
                self.cache.put(&key, raw, policy.cache_ttl).await;
                Ok(FetchedSample {
                    extracted,
                    from_cache: false,
                    attempts,
                })
            }
            Err(AttemptError::Extraction(err)) => Err(FetchError::PermanentExtraction(err)),
            Err(AttemptError::Provider(cause)) if cause.is_retryable() => {
                Err(FetchError::Exhausted {
                    attempts: policy.attempts,
                    last_cause: cause,
                })
            }
            Err(AttemptError::Provider(cause)) => Err(FetchError::Provider(cause)),
        }
    }
}
