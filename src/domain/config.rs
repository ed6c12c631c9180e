//! Ensemble, feed and indicator settings read from a [`ConfigPort`] and
//! validated before anything is built.

use crate::domain::axis::{AxisSettings, DEFAULT_RANDOM_REPLACEMENTS, DEFAULT_WORKER_THREADS};
use crate::domain::boss::{BossSettings, DEFAULT_MUTATE_INTERVAL_SEC, DEFAULT_SAMPLING_PROBABILITY};
use crate::domain::coefficient::N_SLOTS;
use crate::domain::container::{
    ContainerSettings, DEFAULT_PREDICTION_WINDOW_SEC, DEFAULT_WRONGNESS_HIST,
};
use crate::domain::error::HorseError;
use crate::domain::indicator::DEFAULT_LRU_CAPACITY;
use crate::domain::predictor::{model_by_name, PredictorModel};
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;

const ENSEMBLE: &str = "ensemble";
const DEFAULT_PREDICTORS: &str = "ToyPredictor";

#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub wrongness_hist: usize,
    pub prediction_window_sec: f64,
    pub worker_threads: usize,
    pub random_replacements: usize,
    pub sampling_probability: f64,
    pub mutate_interval_sec: f64,
    pub slow_child_warn_ms: u64,
    pub seed: u64,
    pub predictors: Vec<String>,
    pub lru_capacity: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            wrongness_hist: DEFAULT_WRONGNESS_HIST,
            prediction_window_sec: DEFAULT_PREDICTION_WINDOW_SEC,
            worker_threads: DEFAULT_WORKER_THREADS,
            random_replacements: DEFAULT_RANDOM_REPLACEMENTS,
            sampling_probability: DEFAULT_SAMPLING_PROBABILITY,
            mutate_interval_sec: DEFAULT_MUTATE_INTERVAL_SEC,
            slow_child_warn_ms: 5000,
            seed: 0,
            predictors: vec![DEFAULT_PREDICTORS.to_string()],
            lru_capacity: DEFAULT_LRU_CAPACITY,
        }
    }
}

impl EnsembleConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, HorseError> {
        let defaults = Self::default();

        let wrongness_hist = config.get_int(ENSEMBLE, "wrongness_hist", defaults.wrongness_hist as i64);
        if wrongness_hist < 2 {
            return Err(invalid(ENSEMBLE, "wrongness_hist", "must be at least 2"));
        }

        let prediction_window_sec =
            config.get_double(ENSEMBLE, "prediction_window_sec", defaults.prediction_window_sec);
        if prediction_window_sec.is_nan() || prediction_window_sec <= 0.0 {
            return Err(invalid(ENSEMBLE, "prediction_window_sec", "must be positive"));
        }

        let worker_threads = config.get_int(ENSEMBLE, "worker_threads", defaults.worker_threads as i64);
        if worker_threads < 1 {
            return Err(invalid(ENSEMBLE, "worker_threads", "must be at least 1"));
        }

        let random_replacements =
            config.get_int(ENSEMBLE, "random_replacements", defaults.random_replacements as i64);
        let max_random = (N_SLOTS - 3) as i64;
        if !(0..=max_random).contains(&random_replacements) {
            return Err(invalid(
                ENSEMBLE,
                "random_replacements",
                &format!("must be between 0 and {max_random}"),
            ));
        }

        let sampling_probability =
            config.get_double(ENSEMBLE, "sampling_probability", defaults.sampling_probability);
        if sampling_probability.is_nan() || sampling_probability <= 0.0 || sampling_probability > 1.0 {
            return Err(invalid(ENSEMBLE, "sampling_probability", "must be in (0, 1]"));
        }

        let mutate_interval_sec =
            config.get_double(ENSEMBLE, "mutate_interval_sec", defaults.mutate_interval_sec);
        if mutate_interval_sec.is_nan() || mutate_interval_sec <= 0.0 {
            return Err(invalid(ENSEMBLE, "mutate_interval_sec", "must be positive"));
        }

        let slow_child_warn_ms =
            config.get_int(ENSEMBLE, "slow_child_warn_ms", defaults.slow_child_warn_ms as i64);
        if slow_child_warn_ms < 0 {
            return Err(invalid(ENSEMBLE, "slow_child_warn_ms", "must be non-negative"));
        }

        let seed = config.get_int(ENSEMBLE, "seed", 0);
        if seed < 0 {
            return Err(invalid(ENSEMBLE, "seed", "must be non-negative"));
        }

        let mut predictors = config.get_list(ENSEMBLE, "predictors");
        if predictors.is_empty() {
            predictors = defaults.predictors;
        }
        for name in &predictors {
            if model_by_name(name).is_none() {
                return Err(invalid(ENSEMBLE, "predictors", &format!("unknown predictor '{name}'")));
            }
        }

        let lru_capacity = config.get_int("indicators", "lru_capacity", defaults.lru_capacity as i64);
        if lru_capacity < 1 {
            return Err(invalid("indicators", "lru_capacity", "must be at least 1"));
        }

        Ok(Self {
            wrongness_hist: wrongness_hist as usize,
            prediction_window_sec,
            worker_threads: worker_threads as usize,
            random_replacements: random_replacements as usize,
            sampling_probability,
            mutate_interval_sec,
            slow_child_warn_ms: slow_child_warn_ms as u64,
            seed: seed as u64,
            predictors,
            lru_capacity: lru_capacity as usize,
        })
    }

    pub fn boss_settings(&self) -> BossSettings {
        BossSettings {
            axis: AxisSettings {
                container: ContainerSettings {
                    wrongness_hist: self.wrongness_hist,
                    prediction_window_sec: self.prediction_window_sec,
                    slow_child_warn: Duration::from_millis(self.slow_child_warn_ms),
                },
                worker_threads: self.worker_threads,
                random_replacements: self.random_replacements,
            },
            sampling_probability: self.sampling_probability,
            mutate_interval_sec: self.mutate_interval_sec,
            seed: self.seed,
        }
    }

    /// Models named in `predictors`, in order.
    pub fn models(&self) -> Result<Vec<Arc<dyn PredictorModel>>, HorseError> {
        self.predictors
            .iter()
            .map(|name| {
                model_by_name(name)
                    .ok_or_else(|| invalid(ENSEMBLE, "predictors", &format!("unknown predictor '{name}'")))
            })
            .collect()
    }
}

/// Where market data comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub path: Option<String>,
    pub exchange_id: u32,
    pub name: String,
    /// Replay window, inclusive, in unix seconds.
    pub start_ts: Option<f64>,
    pub stop_ts: Option<f64>,
}

impl FeedConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, HorseError> {
        let exchange_id = config.get_int("feed", "exchange_id", 1);
        if exchange_id < 0 || exchange_id > i64::from(u32::MAX) {
            return Err(invalid("feed", "exchange_id", "must fit in an unsigned 32-bit integer"));
        }
        let path = config
            .get_string("feed", "path")
            .filter(|p| !p.trim().is_empty());
        let name = config
            .get_string("feed", "name")
            .unwrap_or_else(|| format!("exchange-{exchange_id}"));
        let start_ts = window_bound(config, "start")?;
        let stop_ts = window_bound(config, "stop")?;
        if let (Some(start), Some(stop)) = (start_ts, stop_ts) {
            if start > stop {
                return Err(invalid("feed", "stop", "must not be before start"));
            }
        }
        Ok(Self {
            path,
            exchange_id: exchange_id as u32,
            name,
            start_ts,
            stop_ts,
        })
    }

    pub fn require_path(&self) -> Result<&str, HorseError> {
        self.path.as_deref().ok_or_else(|| HorseError::ConfigMissing {
            section: "feed".to_string(),
            key: "path".to_string(),
        })
    }
}

/// Accepts unix seconds, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`, all UTC.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Ok(ts) = raw.parse::<f64>() {
        return ts.is_finite().then_some(ts);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp() as f64);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp() as f64)
}

fn window_bound(config: &dyn ConfigPort, key: &str) -> Result<Option<f64>, HorseError> {
    match config.get_string("feed", key).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| invalid("feed", key, &format!("'{raw}' is not a timestamp or date"))),
    }
}

/// `[logging] level`, if set.
pub fn log_level(config: &dyn ConfigPort) -> Option<String> {
    config
        .get_string("logging", "level")
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
}

fn invalid(section: &str, key: &str, reason: &str) -> HorseError {
    HorseError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
