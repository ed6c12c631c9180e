//! CLI integration tests: config loading, the backtest pipeline with memory
//! stores, and the import/info/backtest commands against real files.

mod common;

use common::*;
use luckyhorse::adapters::file_config_adapter::FileConfigAdapter;
use luckyhorse::adapters::snapshot_adapter::JsonSnapshotAdapter;
use luckyhorse::cli::{self, Cli, Command};
use luckyhorse::domain::config::{EnsembleConfig, FeedConfig};
use luckyhorse::domain::error::HorseError;
use luckyhorse::domain::storage::memory::{MemoryIndicatorStore, MemoryTradeStore};
use luckyhorse::ports::snapshot_port::SnapshotPort;
use luckyhorse::ports::trade_store_port::TradeStorePort;
use std::sync::Arc;
use tempfile::tempdir;

fn ini(feed_path: &str, extra: &str) -> String {
    format!(
        r#"
[feed]
path = {feed_path}
exchange_id = 1
name = bitstamp

[ensemble]
wrongness_hist = 5
sampling_probability = 1.0
mutate_interval_sec = 60
worker_threads = 2
seed = 17
predictors = ToyPredictor

[logging]
level = warn
{extra}
"#
    )
}

fn quick_ensemble() -> EnsembleConfig {
    EnsembleConfig {
        wrongness_hist: 5,
        sampling_probability: 1.0,
        worker_threads: 2,
        seed: 17,
        ..EnsembleConfig::default()
    }
}

fn feed() -> FeedConfig {
    FeedConfig {
        path: None,
        exchange_id: 1,
        name: "test".to_string(),
        start_ts: None,
        stop_ts: None,
    }
}

mod parsing {
    use super::*;
    use clap::Parser;

    #[test]
    fn backtest_arguments() {
        let cli = Cli::parse_from([
            "luckyhorse", "backtest", "--config", "lh.ini", "--snapshot", "out.json", "--resume", "in.json", "-v",
        ]);
        match cli.command {
            Command::Backtest { config, snapshot, resume, verbose } => {
                assert_eq!(config.to_str(), Some("lh.ini"));
                assert_eq!(snapshot.unwrap().to_str(), Some("out.json"));
                assert_eq!(resume.unwrap().to_str(), Some("in.json"));
                assert!(verbose);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn import_csv_is_optional() {
        let cli = Cli::parse_from(["luckyhorse", "import", "-c", "lh.ini"]);
        assert!(matches!(cli.command, Command::Import { csv: None, .. }));
    }
}

mod pipeline {
    use super::*;

    #[test]
    fn flat_market_converges() {
        let outcome = cli::run_backtest_pipeline(
            constant_trades(T0, 720, 10.0, 100.0),
            &feed(),
            &quick_ensemble(),
            Arc::new(MemoryTradeStore::new()),
            Arc::new(MemoryIndicatorStore::new()),
            None,
        )
        .unwrap();

        assert_eq!(outcome.replay.published, 720);
        assert_eq!(outcome.judged, 720);
        assert!(outcome.mutations > 0);
        assert_eq!(outcome.least_wrong, Some(("ToyPredictor", 0.0)));
        assert_eq!(outcome.forecast, Some(100.0));
        assert_eq!(outcome.forecast_ts, T0 + 7190.0 + cli::FORECAST_AHEAD_SEC);
        assert!(outcome.description.contains("<Axis ToyPredictor"));
    }

    #[test]
    fn too_few_trades_leave_no_opinion() {
        let outcome = cli::run_backtest_pipeline(
            constant_trades(T0, 2, 10.0, 100.0),
            &feed(),
            &quick_ensemble(),
            Arc::new(MemoryTradeStore::new()),
            Arc::new(MemoryIndicatorStore::new()),
            None,
        )
        .unwrap();
        assert_eq!(outcome.least_wrong, None);
        assert_eq!(outcome.forecast, None);
        assert_eq!(outcome.mutations, 0);
    }

    #[test]
    fn empty_feed_is_an_error() {
        let result = cli::run_backtest_pipeline(
            Vec::new(),
            &feed(),
            &quick_ensemble(),
            Arc::new(MemoryTradeStore::new()),
            Arc::new(MemoryIndicatorStore::new()),
            None,
        );
        assert!(matches!(result, Err(HorseError::Feed { .. })));
    }

    #[test]
    fn resumed_run_starts_hot() {
        let first = cli::run_backtest_pipeline(
            constant_trades(T0, 720, 10.0, 100.0),
            &feed(),
            &quick_ensemble(),
            Arc::new(MemoryTradeStore::new()),
            Arc::new(MemoryIndicatorStore::new()),
            None,
        )
        .unwrap();

        // two trades are not enough to warm a fresh tree, but a resumed one
        // already has its histories
        let resumed = cli::run_backtest_pipeline(
            constant_trades(T0 + 8000.0, 2, 10.0, 100.0),
            &feed(),
            &quick_ensemble(),
            Arc::new(MemoryTradeStore::new()),
            Arc::new(MemoryIndicatorStore::new()),
            Some(&first.snapshot),
        )
        .unwrap();
        assert_eq!(resumed.forecast, Some(100.0));
        assert_eq!(resumed.least_wrong, Some(("ToyPredictor", 0.0)));
    }

    #[test]
    fn resume_rejects_a_different_ensemble() {
        let first = cli::run_backtest_pipeline(
            constant_trades(T0, 20, 10.0, 100.0),
            &feed(),
            &quick_ensemble(),
            Arc::new(MemoryTradeStore::new()),
            Arc::new(MemoryIndicatorStore::new()),
            None,
        )
        .unwrap();
        let other = EnsembleConfig {
            predictors: vec!["PredictorDummy".to_string()],
            ..quick_ensemble()
        };
        let result = cli::run_backtest_pipeline(
            constant_trades(T0, 20, 10.0, 100.0),
            &feed(),
            &other,
            Arc::new(MemoryTradeStore::new()),
            Arc::new(MemoryIndicatorStore::new()),
            Some(&first.snapshot),
        );
        assert!(matches!(result, Err(HorseError::Snapshot { .. })));
    }
}

mod commands {
    use super::*;

    #[test]
    fn missing_config_is_a_parse_error() {
        let result = cli::run_backtest(std::path::Path::new("/nonexistent/lh.ini"), None, None, false);
        assert!(matches!(result, Err(HorseError::ConfigParse { .. })));
    }

    #[test]
    fn backtest_without_feed_path_is_missing_config() {
        let config = write_temp("[ensemble]\nseed = 1\n");
        let result = cli::run_backtest(config.path(), None, None, false);
        assert!(matches!(result, Err(HorseError::ConfigMissing { key, .. }) if key == "path"));
    }

    #[test]
    fn backtest_writes_a_snapshot_it_can_resume_from() {
        let dir = tempdir().unwrap();
        let csv = write_temp(&csv_dump(&constant_trades(T0, 400, 10.0, 100.0)));
        let config = write_temp(&ini(csv.path().to_str().unwrap(), ""));
        let snapshot = dir.path().join("trees.json");

        cli::run_backtest(config.path(), Some(&snapshot), None, false).unwrap();
        let saved = JsonSnapshotAdapter::new().load(&snapshot).unwrap();
        assert_eq!(saved.models().collect::<Vec<_>>(), vec!["ToyPredictor"]);
        assert_eq!(saved.exchange_id, 1);

        cli::run_backtest(config.path(), Some(&snapshot), Some(&snapshot), true).unwrap();
    }

    #[test]
    fn config_drives_the_ensemble() {
        let adapter = FileConfigAdapter::from_string(&ini("/data/trades.csv", "")).unwrap();
        let ensemble = EnsembleConfig::from_config(&adapter).unwrap();
        assert_eq!(ensemble.wrongness_hist, 5);
        assert_eq!(ensemble.predictors, vec!["ToyPredictor"]);
        let (trades, _) = cli::backtest_stores(&adapter).unwrap();
        assert_eq!(trades.count(1).unwrap(), 0);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn import_then_info_then_backtest_on_sqlite() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("trades.db");
        let csv = write_temp(&csv_dump(&price_walk(T0, 300, 30.0)));
        let extra = format!("\n[sqlite]\npath = {}\npool_size = 2\n", db.display());
        let config = write_temp(&ini(csv.path().to_str().unwrap(), &extra));

        cli::run_import(config.path(), None).unwrap();
        // importing twice keeps one copy
        cli::run_import(config.path(), Some(csv.path())).unwrap();
        cli::run_info(config.path()).unwrap();

        let adapter = FileConfigAdapter::from_file(config.path()).unwrap();
        let (trades, _) = cli::backtest_stores(&adapter).unwrap();
        assert_eq!(trades.count(1).unwrap(), 300);
        assert_eq!(trades.time_range(1).unwrap(), Some((T0, T0 + 299.0 * 30.0)));

        cli::run_backtest(config.path(), None, None, false).unwrap();
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn import_needs_a_database_path() {
        let csv = write_temp(&csv_dump(&constant_trades(T0, 3, 10.0, 100.0)));
        let config = write_temp(&ini(csv.path().to_str().unwrap(), ""));
        let result = cli::run_import(config.path(), None);
        assert!(matches!(result, Err(HorseError::ConfigMissing { section, .. }) if section == "sqlite"));
    }
}
