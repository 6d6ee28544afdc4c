use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::{AppConfig, ConcurrencyConfig};
use crate::models::{AlertEvent, NewSample, PriceSample, TrackedItem};
use crate::notify::{DeliveryReport, Notifier};
use crate::plugins::providers::ProviderSettings;
use crate::plugins::ProviderRegistry;
use crate::resilience::{FetchOptions, ResiliencePolicy, ResilientFetcher, ResponseCache};
use crate::rules::{RuleEvaluator, RuleSettings, HISTORY_WINDOW};
use crate::scheduler::ShutdownSignal;
use crate::storage::SampleStore;
use crate::utils::error::{ProviderError, StorageError, TrackError};

/// Result of tracking one item.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub item_id: String,
    pub sample: PriceSample,
    pub alerts: Vec<AlertEvent>,
    pub delivery: DeliveryReport,
    pub from_cache: bool,
}

/// Aggregate of a `track_all` run. Item failures are collected, not raised.
#[derive(Debug, Default)]
pub struct TrackSummary {
    pub tracked: usize,
    pub failed: usize,
    pub alerts: usize,
    pub failures: Vec<(String, TrackError)>,
    pub total_time_ms: u64,
}

impl TrackSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Alerts recomputed from stored samples.
#[derive(Debug, Clone, Default)]
pub struct AlertCheck {
    pub item_id: String,
    pub alerts: Vec<AlertEvent>,
    pub delivery: DeliveryReport,
}

pub struct Tracker {
    fetcher: ResilientFetcher,
    store: Arc<dyn SampleStore>,
    evaluator: RuleEvaluator,
    notifier: Notifier,
    concurrency: ConcurrencyConfig,
    item_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    host_limits: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Tracker {
    pub fn new(
        fetcher: ResilientFetcher,
        store: Arc<dyn SampleStore>,
        evaluator: RuleEvaluator,
        notifier: Notifier,
        concurrency: ConcurrencyConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            evaluator,
            notifier,
            concurrency,
            item_locks: Mutex::new(HashMap::new()),
            host_limits: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the whole pipeline from configuration.
    pub async fn from_config(
        config: &AppConfig,
        store: Arc<dyn SampleStore>,
        notifier: Notifier,
        shutdown: ShutdownSignal,
    ) -> Result<Self, ProviderError> {
        let registry =
            ProviderRegistry::with_defaults(&ProviderSettings::from_defaults(&config.defaults))
                .await?;
        let fetcher = ResilientFetcher::new(
            registry,
            Arc::new(ResponseCache::new()),
            ResiliencePolicy::from_defaults(&config.defaults),
            shutdown,
        );

        Ok(Self::new(
            fetcher,
            store,
            RuleEvaluator::new(RuleSettings::from_config(&config.rules)),
            notifier,
            config.defaults.concurrency.clone(),
        ))
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    async fn item_lock(&self, item_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.item_locks.lock().await;
        locks
            .entry(item_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn host_permit(&self, item: &TrackedItem) -> Option<OwnedSemaphorePermit> {
        let semaphore = {
            let mut limits = self.host_limits.lock().await;
            limits
                .entry(item.host())
                .or_insert_with(|| Arc::new(Semaphore::new(self.concurrency.per_host.max(1))))
                .clone()
        };
        semaphore.acquire_owned().await.ok()
    }

    /// Fetch, persist and evaluate one item, then deliver any alerts.
    pub async fn track_item(
        &self,
        item: &TrackedItem,
        options: FetchOptions,
    ) -> Result<TrackOutcome, TrackError> {
        let fetched = {
            let _permit = self.host_permit(item).await;
            self.fetcher.fetch_sample(item, options).await?
        };

        let extracted = fetched.extracted;
        let new_sample = NewSample::new(&item.id, extracted.price, item.currency(), extracted.in_stock)
            .with_meta(extracted.extra);

        // Writes for one item are serialized so "previous sample" stays well-defined.
        let (sample, alerts) = {
            let lock = self.item_lock(&item.id).await;
            let _guard = lock.lock().await;

            let history = self.store.recent_samples(&item.id, HISTORY_WINDOW).await?;
            let sample = self.store.append_sample(new_sample).await?;
            metrics::counter!("pricetrek_samples_written_total").increment(1);

            let alerts = self.evaluator.evaluate(item, &sample, &history);
            (sample, alerts)
        };

        tracing::info!(
            item = %item.id,
            price = sample.price,
            currency = %sample.currency,
            cached = fetched.from_cache,
            "Tracked {}",
            item.name
        );

        let delivery = self.deliver(item, &alerts).await;

        Ok(TrackOutcome {
            item_id: item.id.clone(),
            sample,
            alerts,
            delivery,
            from_cache: fetched.from_cache,
        })
    }

    async fn deliver(&self, item: &TrackedItem, alerts: &[AlertEvent]) -> DeliveryReport {
        let mut delivery = DeliveryReport::default();
        for alert in alerts {
            metrics::counter!("pricetrek_alerts_total", "kind" => alert.kind.as_str()).increment(1);
            tracing::info!(
                item = %item.id,
                kind = alert.kind.as_str(),
                delta = alert.delta,
                "Alert triggered"
            );
            delivery.merge(self.notifier.notify(alert, item).await);
        }
        delivery
    }

    /// Track every item with bounded concurrency. One item failing never stops the others.
    pub async fn track_all(&self, items: &[TrackedItem], options: FetchOptions) -> TrackSummary {
        let start = Instant::now();
        let workers = self.concurrency.workers.max(1);

        let results: Vec<(String, Result<TrackOutcome, TrackError>)> = stream::iter(items)
            .map(|item| async move { (item.id.clone(), self.track_item(item, options).await) })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut summary = TrackSummary::default();
        for (item_id, result) in results {
            match result {
                Ok(outcome) => {
                    summary.tracked += 1;
                    summary.alerts += outcome.alerts.len();
                }
                Err(e) => {
                    tracing::error!(item = %item_id, "Failed to track item: {}", e);
                    summary.failed += 1;
                    summary.failures.push((item_id, e));
                }
            }
        }
        summary.total_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            tracked = summary.tracked,
            failed = summary.failed,
            alerts = summary.alerts,
            "Price tracking completed in {}ms",
            summary.total_time_ms
        );
        summary
    }

    /// Re-run the rules against the latest stored sample. `dry_run` skips delivery.
    pub async fn reevaluate(
        &self,
        item: &TrackedItem,
        dry_run: bool,
    ) -> Result<AlertCheck, StorageError> {
        let mut samples = self
            .store
            .recent_samples(&item.id, HISTORY_WINDOW + 1)
            .await?;
        if samples.is_empty() {
            tracing::debug!(item = %item.id, "No stored samples yet");
            return Ok(AlertCheck {
                item_id: item.id.clone(),
                ..Default::default()
            });
        }

        let current = samples.remove(0);
        let alerts = self.evaluator.evaluate(item, &current, &samples);
        let delivery = if dry_run {
            DeliveryReport::default()
        } else {
            self.deliver(item, &alerts).await
        };

        Ok(AlertCheck {
            item_id: item.id.clone(),
            alerts,
            delivery,
        })
    }
}
