use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::models::TrackedItem;
use crate::resilience::FetchOptions;
use crate::tracker::Tracker;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Receiving side of a cooperative shutdown. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without triggering.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, ShutdownSignal { rx })
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub runs: u64,
    pub failures: u64,
}

/// Runs `track_all` on a fixed interval until shutdown.
pub struct PollingLoop {
    tracker: Arc<Tracker>,
    interval: Duration,
    shutdown: ShutdownSignal,
}

impl PollingLoop {
    pub fn new(tracker: Arc<Tracker>, interval: Duration, shutdown: ShutdownSignal) -> Self {
        Self {
            tracker,
            interval,
            shutdown,
        }
    }

    /// The first run starts immediately and tracks every item. Afterwards an
    /// item runs again once its own `schedule` (or the loop interval) has
    /// elapsed. A run that overruns the tick pushes the next one back instead
    /// of firing a burst.
    pub async fn run(&self, items: &[TrackedItem], options: FetchOptions) -> LoopStats {
        let mut stats = LoopStats::default();
        let period = items
            .iter()
            .filter_map(|item| item.schedule)
            .fold(self.interval, Duration::min);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_run: HashMap<String, Instant> = HashMap::new();

        tracing::info!(
            "Starting continuous price tracking every {:?} for {} item(s)",
            period,
            items.len()
        );

        loop {
            let now = tokio::select! {
                now = ticker.tick() => now,
                _ = self.shutdown.cancelled() => break,
            };

            let due = due_items(items, &last_run, now, self.interval);
            if due.is_empty() {
                continue;
            }
            for item in &due {
                last_run.insert(item.id.clone(), now);
            }

            let summary = tokio::select! {
                summary = self.tracker.track_all(&due, options) => summary,
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown requested during a tracking run");
                    break;
                }
            };

            stats.runs += 1;
            stats.failures += summary.failed as u64;
            if !summary.is_success() {
                tracing::warn!(
                    "{} item(s) failed, retrying on the next tick",
                    summary.failed
                );
            }
        }

        tracing::info!("Polling loop stopped after {} run(s)", stats.runs);
        stats
    }
}

/// Items whose cadence has elapsed since they last ran. Never-run items are always due.
fn due_items(
    items: &[TrackedItem],
    last_run: &HashMap<String, Instant>,
    now: Instant,
    default_cadence: Duration,
) -> Vec<TrackedItem> {
    items
        .iter()
        .filter(|item| match last_run.get(&item.id) {
            Some(last) => {
                now.saturating_duration_since(*last) >= item.schedule.unwrap_or(default_cadence)
            }
            None => true,
        })
        .cloned()
        .collect()
}

/// Per-item cadence: anything [`parse_interval`] accepts, plus `hourly` and
/// `daily` (with or without a leading `@`).
pub fn parse_schedule(input: &str) -> Result<Duration, String> {
    match input.trim().trim_start_matches('@') {
        "hourly" => Ok(Duration::from_secs(60 * 60)),
        "daily" => Ok(Duration::from_secs(24 * 60 * 60)),
        other => parse_interval(other),
    }
}

/// Parse intervals such as `90s`, `30m`, `1h`, `1h30m` or `2d`. A bare number is seconds.
pub fn parse_interval(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("interval must not be empty".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return non_zero(Duration::from_secs(secs));
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return Err(format!("unknown interval unit '{}' in '{}'", c, input)),
        };
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before '{}' in '{}'", c, input))?;
        total = total.saturating_add(value.saturating_mul(unit));
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("missing unit after '{}' in '{}'", digits, input));
    }

    non_zero(Duration::from_secs(total))
}

fn non_zero(duration: Duration) -> Result<Duration, String> {
    if duration.is_zero() {
        Err("interval must be greater than zero".to_string())
    } else {
        Ok(duration)
    }
}
