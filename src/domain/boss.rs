//! The top of the ensemble: one axis tree per predictor class, scored
//! against sampled trades and evolved on a timer.

use crate::domain::axis::{Axis, AxisSettings};
use crate::domain::clock::{Clock, When};
use crate::domain::container::Container;
use crate::domain::datasource::Datasource;
use crate::domain::error::HorseError;
use crate::domain::predictor::{PredictorFactory, PredictorModel};
use crate::domain::snapshot::{BossSnapshot, RootSnapshot, SNAPSHOT_VERSION};
use crate::domain::trade::Trade;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, Weak};

/// Trade subscribers with a lower number run first; storage must see a trade
/// before the boss judges against it.
pub const JUDGE_PRIORITY: i32 = 500;
pub const MUTATE_TIMER: &str = "boss-mutate";
pub const DEFAULT_SAMPLING_PROBABILITY: f64 = 1.0 / 11.0;
pub const DEFAULT_MUTATE_INTERVAL_SEC: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BossSettings {
    pub axis: AxisSettings,
    /// Chance that any one trade is used for judging.
    pub sampling_probability: f64,
    pub mutate_interval_sec: f64,
    /// Seeds sampling and every axis's evolution.
    pub seed: u64,
}

impl Default for BossSettings {
    fn default() -> Self {
        Self {
            axis: AxisSettings::default(),
            sampling_probability: DEFAULT_SAMPLING_PROBABILITY,
            mutate_interval_sec: DEFAULT_MUTATE_INTERVAL_SEC,
            seed: 0,
        }
    }
}

pub struct PredictionBoss {
    factory: PredictorFactory,
    container: Container<Axis>,
    rng: StdRng,
    settings: BossSettings,
    judged: u64,
    mutations: u64,
}

impl PredictionBoss {
    pub fn new(
        models: &[Arc<dyn PredictorModel>],
        factory: PredictorFactory,
        settings: BossSettings,
    ) -> Result<Self, HorseError> {
        if models.is_empty() {
            return Err(HorseError::InvalidArgument {
                reason: "a prediction boss needs at least one predictor class".to_string(),
            });
        }
        let mut rng = StdRng::seed_from_u64(settings.seed);
        let mut container = Container::new(settings.axis.container);
        for model in models {
            container.push(Axis::root(
                model.clone(),
                factory.clone(),
                settings.axis,
                rng.next_u64(),
            )?);
        }
        tracing::info!(
            exchange_id = factory.exchange_id(),
            predictors = ?models.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "prediction boss ready"
        );
        Ok(Self {
            factory,
            container,
            rng,
            settings,
            judged: 0,
            mutations: 0,
        })
    }

    pub fn settings(&self) -> &BossSettings {
        &self.settings
    }

    pub fn exchange_id(&self) -> u32 {
        self.factory.exchange_id()
    }

    pub fn axes(&self) -> impl Iterator<Item = &Axis> {
        self.container.nodes()
    }

    /// Rounds judged so far.
    pub fn judged(&self) -> u64 {
        self.judged
    }

    /// Mutation sweeps run so far.
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    /// Judge against a sample of the trade stream. Returns whether this trade
    /// was used.
    pub fn on_trade(&mut self, trade: &Trade) -> Result<bool, HorseError> {
        if trade.exchange_id != self.exchange_id() {
            return Ok(false);
        }
        if !self.rng.gen_bool(self.settings.sampling_probability) {
            return Ok(false);
        }
        self.judge(trade.ts_exec, trade.price)?;
        Ok(true)
    }

    pub fn judge(&mut self, ts: f64, true_value: f64) -> Result<(), HorseError> {
        self.container.judge(ts, true_value)?;
        self.judged += 1;
        tracing::debug!(ts, true_value, round = self.judged, "boss judged");
        Ok(())
    }

    pub fn predict(&self, ts: f64, horizon_ts: Option<f64>) -> Result<f64, HorseError> {
        self.container.predict(ts, horizon_ts)
    }

    pub fn preroll(&mut self, ts: f64, true_value: f64) -> Result<(), HorseError> {
        self.container.preroll(ts, true_value)
    }

    /// Every slot of every tree is hot.
    pub fn hist_full_all(&self) -> bool {
        self.container.deep_hist_full_all()
    }

    /// The predictor class whose tree is currently least wrong.
    pub fn least_wrong(&self) -> Result<(&'static str, f64), HorseError> {
        self.container
            .winner()
            .map(|(axis, score)| (axis.model().name(), score))
    }

    /// Evolve every tree if all of them are hot. Returns whether a sweep ran.
    pub fn mutate_if_ready(&mut self) -> Result<bool, HorseError> {
        if !self.hist_full_all() {
            tracing::debug!("trees still warming; mutation skipped");
            return Ok(false);
        }
        self.force_mutate()?;
        Ok(true)
    }

    /// Evolve every tree now, whatever its state.
    pub fn force_mutate(&mut self) -> Result<(), HorseError> {
        let none = Default::default();
        for axis in self.container.nodes_mut() {
            axis.mutate(&none)?;
        }
        self.mutations += 1;
        tracing::info!(sweep = self.mutations, "prediction trees mutated");
        Ok(())
    }

    pub fn describe(&self) -> String {
        let mut out = String::new();
        for scored in self.container.slots() {
            let avg = match scored.average() {
                Some(a) => format!("{a:.4}"),
                None => "-".to_string(),
            };
            let _ = writeln!(out, "{} (avg norm wrong {avg})", scored.node());
            for line in scored.node().describe().lines().skip(1) {
                let _ = writeln!(out, "{line}");
            }
        }
        out
    }

    pub fn snapshot(&self) -> BossSnapshot {
        BossSnapshot {
            version: SNAPSHOT_VERSION,
            exchange_id: self.exchange_id(),
            saved_at: self.factory.storage().clock().time(),
            roots: self
                .container
                .slots()
                .iter()
                .map(|scored| RootSnapshot {
                    history: scored.history().iter().copied().collect(),
                    tree: scored.node().snapshot(),
                })
                .collect(),
        }
    }

    /// Resume from `snapshot`, which must have been taken from a boss over
    /// the same predictor classes and exchange.
    pub fn restore(&mut self, snapshot: &BossSnapshot) -> Result<(), HorseError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(HorseError::Snapshot {
                reason: format!("unsupported snapshot version {}", snapshot.version),
            });
        }
        if snapshot.exchange_id != self.exchange_id() {
            return Err(HorseError::Snapshot {
                reason: format!(
                    "snapshot is for exchange {}, boss forecasts {}",
                    snapshot.exchange_id,
                    self.exchange_id()
                ),
            });
        }
        let ours: Vec<&str> = self.axes().map(|a| a.model().name()).collect();
        let theirs: Vec<&str> = snapshot.models().collect();
        if ours != theirs {
            return Err(HorseError::Snapshot {
                reason: format!("snapshot holds {theirs:?}, boss runs {ours:?}"),
            });
        }
        for (axis, root) in self.axes().zip(&snapshot.roots) {
            axis.check_shape(&root.tree)?;
        }
        for (index, root) in snapshot.roots.iter().enumerate() {
            if let Some(axis) = self.container.node_mut(index) {
                axis.restore(&root.tree)?;
            }
            self.container.restore_history(index, &root.history);
        }
        tracing::info!(saved_at = snapshot.saved_at, roots = snapshot.roots.len(), "prediction trees restored");
        Ok(())
    }
}

impl std::fmt::Debug for PredictionBoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionBoss")
            .field("exchange_id", &self.exchange_id())
            .field("axes", &self.container.len())
            .field("judged", &self.judged)
            .field("mutations", &self.mutations)
            .finish()
    }
}

/// Feed `datasource` trades to `boss` and arm the periodic mutation timer on
/// `clock`. Both hold the boss weakly and stop once it is dropped.
pub fn attach(
    boss: &Arc<Mutex<PredictionBoss>>,
    datasource: &Datasource,
    clock: &Clock,
) -> Result<(), HorseError> {
    let interval = lock(boss).settings.mutate_interval_sec;

    let weak = Arc::downgrade(boss);
    datasource.subscribe(
        JUDGE_PRIORITY,
        Box::new(move |trade: &Trade| {
            let Some(boss) = weak.upgrade() else { return };
            if let Err(e) = lock(&boss).on_trade(trade) {
                tracing::error!(error = %e, trade_id = trade.trade_id, "judging failed");
            }
        }),
    );

    schedule_mutation(clock, Arc::downgrade(boss), interval)
}

fn schedule_mutation(
    clock: &Clock,
    boss: Weak<Mutex<PredictionBoss>>,
    interval: f64,
) -> Result<(), HorseError> {
    clock.set_timer(
        MUTATE_TIMER,
        When::In(interval),
        0,
        Box::new(move |clock: &Clock| {
            let Some(strong) = boss.upgrade() else { return };
            if let Err(e) = lock(&strong).mutate_if_ready() {
                tracing::error!(error = %e, "mutation sweep failed");
            }
            drop(strong);
            if let Err(e) = schedule_mutation(clock, boss, interval) {
                tracing::error!(error = %e, "could not re-arm mutation timer");
            }
        }),
    )
}

fn lock(boss: &Mutex<PredictionBoss>) -> std::sync::MutexGuard<'_, PredictionBoss> {
    boss.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
