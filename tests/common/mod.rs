#![allow(dead_code)]

use luckyhorse::domain::axis::{Axis, AxisSettings};
use luckyhorse::domain::boss::{BossSettings, PredictionBoss};
use luckyhorse::domain::clock::Clock;
use luckyhorse::domain::container::ContainerSettings;
use luckyhorse::domain::indicator::IndicatorFactory;
use luckyhorse::domain::predictor::{model_by_name, PredictorFactory};
use luckyhorse::domain::storage::{memory, StorageEngine};
use luckyhorse::domain::trade::Trade;
use std::io::Write;
use std::sync::Arc;

/// 2015-03-01 12:00:00 UTC.
pub const T0: f64 = 1_425_211_200.0;
pub const HOUR: f64 = 3600.0;

pub fn trade(id: i64, ts: f64, price: f64) -> Trade {
    Trade::new(1, id, price, 1.0, ts, ts).unwrap()
}

/// One trade every `step_sec` from `start_ts`, price wandering around 250
/// on a slow sine with a gentle upward drift.
pub fn price_walk(start_ts: f64, count: usize, step_sec: f64) -> Vec<Trade> {
    (0..count)
        .map(|i| {
            let ts = start_ts + i as f64 * step_sec;
            let price = 250.0 + 10.0 * (i as f64 / 40.0).sin() + i as f64 * 0.01;
            trade(i as i64 + 1, ts, (price * 100.0).floor() / 100.0)
        })
        .collect()
}

pub fn constant_trades(start_ts: f64, count: usize, step_sec: f64, price: f64) -> Vec<Trade> {
    (0..count)
        .map(|i| trade(i as i64 + 1, start_ts + i as f64 * step_sec, price))
        .collect()
}

/// bitcoincharts-style dump of `trades`.
pub fn csv_dump(trades: &[Trade]) -> String {
    trades
        .iter()
        .map(|t| format!("{},{},{}\n", t.ts_exec as i64, t.price, t.volume))
        .collect()
}

pub fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn engine_at(ts: f64) -> StorageEngine {
    memory::engine(Arc::new(Clock::fixed(ts)))
}

pub fn predictor_factory(engine: StorageEngine) -> PredictorFactory {
    PredictorFactory::new(Arc::new(IndicatorFactory::new(engine, 64)), 1)
}

/// Short histories so tests warm up quickly.
pub fn quick_axis_settings() -> AxisSettings {
    AxisSettings {
        container: ContainerSettings {
            wrongness_hist: 5,
            ..ContainerSettings::default()
        },
        worker_threads: 2,
        ..AxisSettings::default()
    }
}

pub fn root_axis(name: &str, seed: u64) -> Axis {
    Axis::root(
        model_by_name(name).unwrap(),
        predictor_factory(engine_at(T0)),
        quick_axis_settings(),
        seed,
    )
    .unwrap()
}

pub fn boss(names: &[&str], engine: StorageEngine) -> PredictionBoss {
    let models: Vec<_> = names.iter().map(|n| model_by_name(n).unwrap()).collect();
    let settings = BossSettings {
        axis: quick_axis_settings(),
        sampling_probability: 1.0,
        ..BossSettings::default()
    };
    PredictionBoss::new(&models, predictor_factory(engine), settings).unwrap()
}
