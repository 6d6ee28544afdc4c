use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use pricetrek::config::{AppConfig, DEFAULT_CONFIG_PATH};
use pricetrek::models::TrackedItem;
use pricetrek::notify::{format_alert, format_price, Notifier};
use pricetrek::resilience::FetchOptions;
use pricetrek::scheduler::{parse_interval, PollingLoop, ShutdownHandle, ShutdownSignal};
use pricetrek::storage::{SampleStore, SqliteStore};
use pricetrek::{AppError, Tracker};

#[derive(Parser, Debug)]
#[command(name = "pricetrek", version, about = "Track product prices and get alerted on drops")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write a daily rolling log file into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch prices, store samples and send alerts
    Track(TrackArgs),
    /// Re-evaluate alert rules against stored samples
    Alert(AlertArgs),
    /// Show the stored price history of one item
    History(HistoryArgs),
    /// Check configuration, storage and notification channels
    Doctor,
}

#[derive(Args, Debug)]
struct TrackArgs {
    /// Run a single pass and exit (default)
    #[arg(long, conflicts_with = "run_loop")]
    once: bool,

    /// Keep tracking on a fixed interval until interrupted
    #[arg(long = "loop")]
    run_loop: bool,

    /// Only track this item
    #[arg(long)]
    id: Option<String>,

    /// Ignore cached responses
    #[arg(long)]
    no_cache: bool,

    /// Interval between runs in loop mode (e.g. 30m, 1h)
    #[arg(long, value_parser = parse_interval, default_value = "1h")]
    interval: Duration,
}

#[derive(Args, Debug)]
struct AlertArgs {
    /// Only check this item
    #[arg(long)]
    id: Option<String>,

    /// Print alerts instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Item to show
    #[arg(long)]
    id: String,

    /// Number of most recent samples
    #[arg(long, default_value_t = 10)]
    limit: usize,

    /// Print samples as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let directive = if verbose { "pricetrek=debug" } else { "pricetrek=info" };
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pricetrek.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let _guard = match init_tracing(cli.verbose, cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialise logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Command::Track(args) => track(&config, args).await,
        Command::Alert(args) => alert(&config, args).await,
        Command::History(args) => history(&config, args).await,
        Command::Doctor => doctor(&config).await,
    }
}

fn load_config(path: &Path) -> pricetrek::Result<AppConfig> {
    Ok(AppConfig::load(path)?)
}

async fn connect_store(path: &str) -> pricetrek::Result<SqliteStore> {
    let store = SqliteStore::open(path).await?;
    store.ping().await?;
    Ok(store)
}

async fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>> {
    let store = connect_store(&config.storage.path)
        .await
        .with_context(|| format!("Failed to open storage at {}", config.storage.path))?;
    Ok(Arc::new(store))
}

fn select_items(config: &AppConfig, id: Option<&str>) -> Result<Vec<TrackedItem>> {
    let currency = config.defaults.currency.as_str();
    match id {
        Some(id) => {
            let item = config.find_item(id).ok_or_else(|| AppError::NotFound {
                resource: format!("item '{}'", id),
            })?;
            Ok(vec![TrackedItem::from_config(item, currency)])
        }
        None => Ok(config
            .items
            .iter()
            .map(|item| TrackedItem::from_config(item, currency))
            .collect()),
    }
}

fn spawn_ctrl_c(handle: ShutdownHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            handle.trigger();
        }
    });
}

async fn track(config: &AppConfig, args: TrackArgs) -> Result<ExitCode> {
    let items = select_items(config, args.id.as_deref())?;
    let store = open_store(config).await?;

    let (handle, signal) = ShutdownHandle::new();
    spawn_ctrl_c(handle);

    let notifier = Notifier::from_config(&config.notifications);
    let tracker = Arc::new(
        Tracker::from_config(config, store, notifier, signal.clone())
            .await
            .context("Failed to initialise providers")?,
    );
    let options = FetchOptions {
        force_refresh: args.no_cache,
    };

    if args.run_loop && !args.once {
        PollingLoop::new(tracker, args.interval, signal)
            .run(&items, options)
            .await;
        return Ok(ExitCode::SUCCESS);
    }

    let summary = tracker.track_all(&items, options).await;
    println!(
        "Tracked {} item(s), {} alert(s), {} failure(s)",
        summary.tracked, summary.alerts, summary.failed
    );
    for (item_id, error) in &summary.failures {
        println!("  {}: {}", item_id, error);
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn alert(config: &AppConfig, args: AlertArgs) -> Result<ExitCode> {
    let items = select_items(config, args.id.as_deref())?;
    let store = open_store(config).await?;
    let notifier = if args.dry_run {
        Notifier::empty()
    } else {
        Notifier::from_config(&config.notifications)
    };
    let tracker = Tracker::from_config(config, store, notifier, ShutdownSignal::never())
        .await
        .context("Failed to initialise providers")?;

    let mut failures = 0usize;
    for item in &items {
        match tracker.reevaluate(item, args.dry_run).await {
            Ok(check) => {
                for event in &check.alerts {
                    println!("[{}] {}", event.kind.as_str(), format_alert(event, item));
                }
            }
            Err(e) => {
                tracing::error!(item = %item.id, "Failed to check alerts: {}", e);
                failures += 1;
            }
        }
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn history(config: &AppConfig, args: HistoryArgs) -> Result<ExitCode> {
    let item = select_items(config, Some(&args.id))?.remove(0);
    let store = open_store(config).await?;
    let samples = store.recent_samples(&item.id, args.limit).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} ({})", item.name, item.id);
    if samples.is_empty() {
        println!("  no samples yet");
    }
    for sample in &samples {
        let stock = match sample.in_stock() {
            Some(false) => "  out of stock",
            _ => "",
        };
        println!(
            "  {}  {:>12}{}",
            sample.timestamp.format("%Y-%m-%d %H:%M"),
            format_price(sample.price, &sample.currency),
            stock
        );
    }

    Ok(ExitCode::SUCCESS)
}

async fn doctor(config: &AppConfig) -> Result<ExitCode> {
    println!("Configuration OK ({} item(s))", config.items.len());

    let store = open_store(config).await?;
    println!("Storage OK ({})", config.storage.path);

    let notifier = Notifier::from_config(&config.notifications);
    if notifier.is_empty() {
        println!("No notification channels enabled");
    } else {
        println!("Notification channels: {}", notifier.channel_names().join(", "));
    }

    for item in select_items(config, None)? {
        let latest = store.latest_sample(&item.id).await?;
        let last = match latest {
            Some(sample) => format!(
                "{} at {}",
                format_price(sample.price, &sample.currency),
                sample.timestamp.format("%Y-%m-%d %H:%M UTC")
            ),
            None => "no samples yet".to_string(),
        };
        println!("  {} [{}] {}", item.id, item.provider, last);
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_args() {
        let cli = Cli::try_parse_from(["pricetrek", "history", "--id", "kettle", "--limit", "3", "--json"]).unwrap();
        match cli.command {
            Command::History(args) => {
                assert_eq!(args.id, "kettle");
                assert_eq!(args.limit, 3);
                assert!(args.json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_history_defaults_and_requires_id() {
        let cli = Cli::try_parse_from(["pricetrek", "history", "--id", "kettle"]).unwrap();
        let Command::History(args) = cli.command else {
            panic!("expected history");
        };
        assert_eq!(args.limit, 10);
        assert!(!args.json);

        assert!(Cli::try_parse_from(["pricetrek", "history"]).is_err());
    }

    #[test]
    fn test_history_rejects_unknown_item() {
        let config = AppConfig::default();
        assert!(select_items(&config, Some("missing")).is_err());
    }
}
