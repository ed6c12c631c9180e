//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use crate::adapters::csv_adapter::CsvTradeFeed;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::snapshot_adapter::JsonSnapshotAdapter;
use crate::domain::boss::{self, PredictionBoss};
use crate::domain::clock::{printable_ts, Clock};
use crate::domain::config::{log_level, EnsembleConfig, FeedConfig};
use crate::domain::datasource::Datasource;
use crate::domain::error::HorseError;
use crate::domain::indicator::IndicatorFactory;
use crate::domain::predictor::PredictorFactory;
use crate::domain::replay::{replay, ReplaySummary};
use crate::domain::snapshot::BossSnapshot;
use crate::domain::storage::{memory, StorageEngine};
use crate::domain::trade::Trade;
use crate::ports::config_port::ConfigPort;
use crate::ports::feed_port::TradeFeedPort;
use crate::ports::indicator_store_port::IndicatorStorePort;
use crate::ports::snapshot_port::SnapshotPort;
use crate::ports::trade_store_port::TradeStorePort;

/// How far past the last replayed trade the closing forecast looks.
pub const FORECAST_AHEAD_SEC: f64 = 3600.0;

#[derive(Parser, Debug)]
#[command(name = "luckyhorse", about = "Evolutionary ensemble of market price forecasters")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a trade CSV into the SQLite store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [feed] path
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Replay the feed through the prediction ensemble
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Save the evolved trees here when the replay ends
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
        /// Start from trees saved by an earlier run
        #[arg(short, long)]
        resume: Option<PathBuf>,
        /// Print every tree when done
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show stored trade count and time range
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Import { config, csv } => run_import(&config, csv.as_deref()),
        Command::Backtest {
            config,
            snapshot,
            resume,
            verbose,
        } => run_backtest(&config, snapshot.as_deref(), resume.as_deref(), verbose),
        Command::Info { config } => run_info(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, HorseError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    init_logging(&adapter);
    Ok(adapter)
}

/// `RUST_LOG` wins over `[logging] level`, which wins over `info`. A second
/// call is a no-op.
pub fn init_logging(config: &dyn ConfigPort) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = log_level(config).unwrap_or_else(|| "info".to_string());
        tracing_subscriber::EnvFilter::try_new(&level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run_import(config_path: &Path, csv_override: Option<&Path>) -> Result<(), HorseError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    let feed = FeedConfig::from_config(&config)?;
    let source = match csv_override {
        Some(path) => CsvTradeFeed::new(path).with_window(feed.start_ts, feed.stop_ts),
        None => CsvTradeFeed::from_feed_config(&feed)?,
    };

    let store = open_sqlite(&config)?;
    eprintln!("Reading trades from {}", source.path().display());
    let trades = source.load_trades(feed.exchange_id)?;
    let kept = store.store_many(&trades)?;
    println!(
        "{}: imported {kept} of {} trades ({} already stored or stale)",
        feed.name,
        trades.len(),
        trades.len() - kept
    );
    Ok(())
}

pub fn run_info(config_path: &Path) -> Result<(), HorseError> {
    let config = load_config(config_path)?;
    let feed = FeedConfig::from_config(&config)?;
    let store = open_sqlite(&config)?;
    let count = store.count(feed.exchange_id)?;
    match store.time_range(feed.exchange_id)? {
        Some((first, last)) => println!(
            "{} (exchange {}): {count} trades, {} to {}",
            feed.name,
            feed.exchange_id,
            printable_ts(first),
            printable_ts(last)
        ),
        None => println!("{} (exchange {}): no trades stored", feed.name, feed.exchange_id),
    }
    Ok(())
}

pub fn run_backtest(
    config_path: &Path,
    snapshot_path: Option<&Path>,
    resume_path: Option<&Path>,
    verbose: bool,
) -> Result<(), HorseError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    let ensemble = EnsembleConfig::from_config(&config)?;
    let feed = FeedConfig::from_config(&config)?;

    let source = CsvTradeFeed::from_feed_config(&feed)?;
    eprintln!("Reading trades from {}", source.path().display());
    let trades = source.load_trades(feed.exchange_id)?;

    let snapshots = JsonSnapshotAdapter::pretty();
    let resume = resume_path.map(|p| snapshots.load(p)).transpose()?;

    let (trade_store, indicator_store) = backtest_stores(&config)?;
    eprintln!(
        "Running {} predictor classes over {} trades",
        ensemble.predictors.len(),
        trades.len()
    );
    let outcome = run_backtest_pipeline(
        trades,
        &feed,
        &ensemble,
        trade_store,
        indicator_store,
        resume.as_ref(),
    )?;

    print_outcome(&feed, &outcome, verbose);
    if let Some(path) = snapshot_path {
        snapshots.save(&outcome.snapshot, path)?;
        eprintln!("\nSnapshot written to: {}", path.display());
    }
    Ok(())
}

/// What a replay through the ensemble produced.
#[derive(Debug)]
pub struct BacktestOutcome {
    pub replay: ReplaySummary,
    pub judged: u64,
    pub mutations: u64,
    /// Predictor class of the least wrong tree and its average wrongness.
    pub least_wrong: Option<(&'static str, f64)>,
    pub forecast_ts: f64,
    pub forecast: Option<f64>,
    pub description: String,
    pub snapshot: BossSnapshot,
}

/// Replay `trades` through a freshly built boss. The clock starts at the
/// first trade so the mutation timer runs on replay time.
pub fn run_backtest_pipeline(
    trades: Vec<Trade>,
    feed: &FeedConfig,
    ensemble: &EnsembleConfig,
    trade_store: Arc<dyn TradeStorePort>,
    indicator_store: Arc<dyn IndicatorStorePort>,
    resume: Option<&BossSnapshot>,
) -> Result<BacktestOutcome, HorseError> {
    let first_ts = trades
        .iter()
        .find(|t| t.exchange_id == feed.exchange_id)
        .map(|t| t.ts_exec)
        .ok_or_else(|| HorseError::Feed {
            reason: format!("no trades for exchange {} to replay", feed.exchange_id),
        })?;

    let clock = Arc::new(Clock::fixed(first_ts));
    let storage = StorageEngine::new(trade_store, indicator_store, clock.clone());
    let datasource = Datasource::new(feed.exchange_id, feed.name.clone()).with_start_ts(first_ts);
    storage.subscribe_to(&datasource);

    let indicators = Arc::new(IndicatorFactory::new(storage, ensemble.lru_capacity));
    let predictors = PredictorFactory::new(indicators, feed.exchange_id);
    let mut prediction_boss =
        PredictionBoss::new(&ensemble.models()?, predictors, ensemble.boss_settings())?;
    if let Some(snapshot) = resume {
        prediction_boss.restore(snapshot)?;
    }
    let prediction_boss = Arc::new(Mutex::new(prediction_boss));
    boss::attach(&prediction_boss, &datasource, &clock)?;

    let summary = replay(trades, &datasource, &clock);

    let guard = prediction_boss
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let last_ts = summary.last_ts.unwrap_or(first_ts);
    let forecast_ts = last_ts + FORECAST_AHEAD_SEC;
    let forecast = match guard.predict(forecast_ts, Some(last_ts)) {
        Ok(value) => Some(value),
        Err(e) if e.is_insufficient_data() => {
            tracing::info!(reason = %e, "no forecast yet");
            None
        }
        Err(e) => return Err(e),
    };
    let least_wrong = match guard.least_wrong() {
        Ok(winner) => Some(winner),
        Err(e) if e.is_insufficient_data() => None,
        Err(e) => return Err(e),
    };

    Ok(BacktestOutcome {
        replay: summary,
        judged: guard.judged(),
        mutations: guard.mutations(),
        least_wrong,
        forecast_ts,
        forecast,
        description: guard.describe(),
        snapshot: guard.snapshot(),
    })
}

fn print_outcome(feed: &FeedConfig, outcome: &BacktestOutcome, verbose: bool) {
    println!("\n=== {} ===", feed.name);
    println!("Replayed:         {}", outcome.replay);
    println!("Judged rounds:    {}", outcome.judged);
    println!("Mutation sweeps:  {}", outcome.mutations);
    match outcome.least_wrong {
        Some((name, score)) => println!("Least wrong:      {name} ({score:.6})"),
        None => println!("Least wrong:      - (trees still warming)"),
    }
    if let Some(price) = outcome.replay.last_price {
        println!("Last price:       {price:.2}");
    }
    match outcome.forecast {
        Some(value) => println!(
            "Forecast:         {value:.2} at {}",
            printable_ts(outcome.forecast_ts)
        ),
        None => println!("Forecast:         - (not enough history)"),
    }
    if verbose {
        println!("\n{}", outcome.description);
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &dyn ConfigPort) -> Result<crate::adapters::sqlite_adapter::SqliteAdapter, HorseError> {
    let adapter = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
    adapter.initialize_schema()?;
    Ok(adapter)
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &dyn ConfigPort) -> Result<memory::MemoryTradeStore, HorseError> {
    Err(HorseError::Database {
        reason: "built without the sqlite feature".to_string(),
    })
}

/// SQLite when `[sqlite] path` is set, memory otherwise.
pub fn backtest_stores(
    config: &dyn ConfigPort,
) -> Result<(Arc<dyn TradeStorePort>, Arc<dyn IndicatorStorePort>), HorseError> {
    #[cfg(feature = "sqlite")]
    if config.get_string("sqlite", "path").is_some() {
        let adapter = Arc::new(open_sqlite(config)?);
        let trades: Arc<dyn TradeStorePort> = adapter.clone();
        let indicators: Arc<dyn IndicatorStorePort> = adapter;
        return Ok((trades, indicators));
    }
    let trades: Arc<dyn TradeStorePort> = Arc::new(memory::MemoryTradeStore::new());
    let indicators: Arc<dyn IndicatorStorePort> = Arc::new(memory::MemoryIndicatorStore::new());
    #[cfg(not(feature = "sqlite"))]
    let _ = config;
    Ok((trades, indicators))
}
