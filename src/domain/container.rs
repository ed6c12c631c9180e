//! Scoring, consensus and winner selection shared by axes and the boss.
//!
//! Each child carries a rolling history of normalised wrongness. A child is
//! *cold* with no history, *warming* while the history is short and *hot* once
//! it holds `wrongness_hist` samples; only hot children have an average and
//! only they take part in predictions, winner selection and mutation.

use crate::domain::error::HorseError;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_WRONGNESS_HIST: usize = 50;
pub const DEFAULT_PREDICTION_WINDOW_SEC: f64 = 30.0 * 60.0;
pub const DEFAULT_SLOW_CHILD_WARN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerSettings {
    /// Samples kept per child; a child is hot once this many are held.
    pub wrongness_hist: usize,
    /// Lead time under test: judging at `ts` forecasts with data up to
    /// `ts - prediction_window_sec`.
    pub prediction_window_sec: f64,
    /// A single child call taking longer than this is logged.
    pub slow_child_warn: Duration,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            wrongness_hist: DEFAULT_WRONGNESS_HIST,
            prediction_window_sec: DEFAULT_PREDICTION_WINDOW_SEC,
            slow_child_warn: DEFAULT_SLOW_CHILD_WARN,
        }
    }
}

/// A node that can sit in a [`Container`].
pub trait Contestant: Send + Sync {
    /// Wrongness of this node for one judging round.
    fn score(&mut self, ts: f64, true_value: f64, horizon_ts: f64) -> Result<f64, HorseError>;

    fn predict(&self, ts: f64, horizon_ts: Option<f64>) -> Result<f64, HorseError>;

    /// Bring any nested containers to the hot state.
    fn preroll(&mut self, ts: f64, true_value: f64) -> Result<(), HorseError>;

    /// Whether every container below this node is fully hot.
    fn deep_hist_full(&self) -> bool;

    fn label(&self) -> String;
}

/// `|true_value - forecast| / |forecast|`. `None` when the forecast cannot be
/// used as a denominator.
pub fn wrongness(true_value: f64, forecast: f64) -> Option<f64> {
    if forecast == 0.0 || !forecast.is_finite() {
        return None;
    }
    Some((true_value - forecast).abs() / forecast.abs())
}

#[derive(Debug)]
pub struct Scored<C> {
    node: C,
    history: VecDeque<f64>,
    average: Option<f64>,
}

impl<C> Scored<C> {
    fn new(node: C) -> Self {
        Self {
            node,
            history: VecDeque::new(),
            average: None,
        }
    }

    pub fn node(&self) -> &C {
        &self.node
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    pub fn average(&self) -> Option<f64> {
        self.average
    }

    fn record(&mut self, sample: f64, capacity: usize) {
        self.history.push_back(sample);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
        if self.history.len() == capacity {
            self.average = Some(self.history.iter().sum::<f64>() / capacity as f64);
        }
    }

    fn reset(&mut self) {
        self.history.clear();
        self.average = None;
    }
}

pub struct Container<C> {
    slots: Vec<Scored<C>>,
    settings: ContainerSettings,
    pool: Option<Arc<ThreadPool>>,
}

impl<C: Contestant> Container<C> {
    pub fn new(settings: ContainerSettings) -> Self {
        Self {
            slots: Vec::new(),
            settings,
            pool: None,
        }
    }

    /// Fan child calls out over `pool` and join before returning.
    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn push(&mut self, node: C) {
        self.slots.push(Scored::new(node));
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Scored<C>] {
        &self.slots
    }

    pub fn node(&self, index: usize) -> Option<&C> {
        self.slots.get(index).map(|s| &s.node)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut C> {
        self.slots.get_mut(index).map(|s| &mut s.node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &C> {
        self.slots.iter().map(|s| &s.node)
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut C> {
        self.slots.iter_mut().map(|s| &mut s.node)
    }

    /// Score every child against the same `(ts, true_value)`. Children
    /// without an answer this round are skipped; any other failure aborts
    /// the round before histories are touched.
    pub fn judge(&mut self, ts: f64, true_value: f64) -> Result<(), HorseError> {
        let horizon_ts = ts - self.settings.prediction_window_sec;
        let warn_after = self.settings.slow_child_warn;
        let score = |slot: &mut Scored<C>| -> Result<Option<f64>, HorseError> {
            let started = Instant::now();
            let result = slot.node.score(ts, true_value, horizon_ts);
            warn_if_slow(started, warn_after, "judge", || slot.node.label());
            answer_or_skip(result)
        };

        let results: Vec<Result<Option<f64>, HorseError>> = match &self.pool {
            Some(pool) => pool.install(|| self.slots.par_iter_mut().map(score).collect()),
            None => self.slots.iter_mut().map(score).collect(),
        };
        let scores = results.into_iter().collect::<Result<Vec<_>, _>>()?;

        let capacity = self.settings.wrongness_hist;
        for (slot, score) in self.slots.iter_mut().zip(scores) {
            if let Some(w) = score {
                slot.record(w, capacity);
            }
        }
        tracing::trace!(ts, true_value, children = self.slots.len(), "judged");
        Ok(())
    }

    /// Consensus forecast of the hot children, weighted by the inverse of
    /// their average wrongness. A hot child with zero wrongness wins outright.
    pub fn predict(&self, ts: f64, horizon_ts: Option<f64>) -> Result<f64, HorseError> {
        let hot: Vec<&Scored<C>> = self.slots.iter().filter(|s| s.average.is_some()).collect();
        if hot.is_empty() {
            return Err(HorseError::insufficient(
                "no children with complete history; can't predict",
            ));
        }

        let warn_after = self.settings.slow_child_warn;
        let forecast = |slot: &&Scored<C>| -> Result<Option<f64>, HorseError> {
            let started = Instant::now();
            let result = slot.node.predict(ts, horizon_ts);
            warn_if_slow(started, warn_after, "predict", || slot.node.label());
            answer_or_skip(result)
        };
        let results: Vec<Result<Option<f64>, HorseError>> = match &self.pool {
            Some(pool) => pool.install(|| hot.par_iter().map(forecast).collect()),
            None => hot.iter().map(forecast).collect(),
        };

        let mut weighted = Vec::with_capacity(hot.len());
        for (slot, result) in hot.iter().zip(results) {
            let Some(value) = result? else { continue };
            match slot.average {
                Some(avg) if avg == 0.0 => return Ok(value),
                Some(avg) => weighted.push((value, 1.0 / avg)),
                None => {}
            }
        }
        if weighted.is_empty() {
            return Err(HorseError::insufficient("no child returned a prediction"));
        }
        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        Ok(weighted.iter().map(|(v, w)| v * w).sum::<f64>() / total)
    }

    /// The hot child with the lowest average wrongness.
    pub fn winner(&self) -> Result<(&C, f64), HorseError> {
        self.winner_index()
            .and_then(|i| self.slots[i].average.map(|a| (&self.slots[i].node, a)))
            .ok_or_else(|| HorseError::insufficient("not enough candidates to have a winner"))
    }

    pub fn winner_index(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.average.map(|a| (i, a)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Slot indices ordered best first. Children without an average sort
    /// last.
    pub fn ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        order.sort_by(|&a, &b| match (self.slots[a].average, self.slots[b].average) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        order
    }

    pub fn hist_full(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|s| s.history.len() == self.settings.wrongness_hist)
    }

    /// Every direct child is hot.
    pub fn hist_full_all(&self) -> bool {
        (0..self.slots.len()).all(|i| self.hist_full(i))
    }

    /// Every direct child is hot, and so is everything below them.
    pub fn deep_hist_full_all(&self) -> bool {
        self.hist_full_all() && self.slots.iter().all(|s| s.node.deep_hist_full())
    }

    /// Prime children first, then judge until every child is hot.
    pub fn preroll(&mut self, ts: f64, true_value: f64) -> Result<(), HorseError> {
        for slot in &mut self.slots {
            slot.node.preroll(ts, true_value)?;
        }
        for _ in 0..self.settings.wrongness_hist {
            self.judge(ts, true_value)?;
        }
        Ok(())
    }

    /// Forget a child's history; it is cold again.
    pub fn reset(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.reset();
        }
    }

    pub fn reset_all(&mut self) {
        for slot in &mut self.slots {
            slot.reset();
        }
    }

    /// Replace a child's history, keeping at most the newest
    /// `wrongness_hist` samples.
    pub fn restore_history(&mut self, index: usize, samples: &[f64]) {
        let capacity = self.settings.wrongness_hist;
        if let Some(slot) = self.slots.get_mut(index) {
            slot.reset();
            for &w in samples {
                slot.record(w, capacity);
            }
        }
    }
}

fn answer_or_skip(result: Result<f64, HorseError>) -> Result<Option<f64>, HorseError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_insufficient_data() => Ok(None),
        Err(e) => Err(e),
    }
}

fn warn_if_slow(started: Instant, limit: Duration, op: &str, label: impl FnOnce() -> String) {
    let elapsed = started.elapsed();
    if elapsed > limit {
        tracing::warn!(
            child = %label(),
            op,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow child"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Forecasts a constant; fails with the configured error if set.
    #[derive(Debug)]
    struct Fixed {
        value: f64,
        fail: Option<fn() -> HorseError>,
    }

    impl Fixed {
        fn new(value: f64) -> Self {
            Self { value, fail: None }
        }
    }

    impl Contestant for Fixed {
        fn score(&mut self, ts: f64, true_value: f64, horizon_ts: f64) -> Result<f64, HorseError> {
            let forecast = self.predict(ts, Some(horizon_ts))?;
            wrongness(true_value, forecast).ok_or_else(|| HorseError::insufficient("zero"))
        }

        fn predict(&self, _ts: f64, _horizon_ts: Option<f64>) -> Result<f64, HorseError> {
            match self.fail {
                Some(make) => Err(make()),
                None => Ok(self.value),
            }
        }

        fn preroll(&mut self, _ts: f64, _true_value: f64) -> Result<(), HorseError> {
            Ok(())
        }

        fn deep_hist_full(&self) -> bool {
            true
        }

        fn label(&self) -> String {
            format!("Fixed({})", self.value)
        }
    }

    fn settings(hist: usize) -> ContainerSettings {
        ContainerSettings {
            wrongness_hist: hist,
            ..ContainerSettings::default()
        }
    }

    fn container(values: &[f64], hist: usize) -> Container<Fixed> {
        let mut c = Container::new(settings(hist));
        for v in values {
            c.push(Fixed::new(*v));
        }
        c
    }

    #[test]
    fn wrongness_is_normalised_by_forecast() {
        assert_relative_eq!(wrongness(103.0, 100.0).unwrap(), 0.03, epsilon = 1e-12);
        assert_relative_eq!(wrongness(-500.0, 100.0).unwrap(), 6.0);
        assert_eq!(wrongness(100.0, 100.0), Some(0.0));
        assert_eq!(wrongness(100.0, 0.0), None);
    }

    #[test]
    fn children_go_cold_warming_hot() {
        let mut c = container(&[100.0], 3);
        assert!(c.winner().unwrap_err().is_insufficient_data());
        c.judge(0.0, 103.0).unwrap();
        c.judge(0.0, 103.0).unwrap();
        assert!(!c.hist_full(0));
        assert!(c.predict(0.0, None).unwrap_err().is_insufficient_data());
        c.judge(0.0, 103.0).unwrap();
        assert!(c.hist_full(0));
        let (_, score) = c.winner().unwrap();
        assert_relative_eq!(score, 0.03, epsilon = 1e-12);
    }

    #[test]
    fn history_is_bounded_and_averaged() {
        let mut c = container(&[100.0], 2);
        c.judge(0.0, 110.0).unwrap();
        c.judge(0.0, 130.0).unwrap();
        assert_relative_eq!(c.slots()[0].average().unwrap(), 0.2, epsilon = 1e-12);
        c.judge(0.0, 100.0).unwrap();
        assert_eq!(c.slots()[0].history().len(), 2);
        assert_relative_eq!(c.slots()[0].average().unwrap(), 0.15, epsilon = 1e-12);
    }

    #[test]
    fn predict_weights_by_inverse_wrongness() {
        let mut c = container(&[90.0, 120.0], 1);
        c.judge(0.0, 100.0).unwrap();
        // wrongness 1/9 and 1/6, weights 9 and 6
        let expected = (90.0 * 9.0 + 120.0 * 6.0) / 15.0;
        assert_relative_eq!(c.predict(0.0, None).unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn zero_wrongness_short_circuits() {
        let mut c = container(&[90.0, 100.0, 110.0], 2);
        c.preroll(0.0, 100.0).unwrap();
        let (winner, score) = c.winner().unwrap();
        assert_eq!(score, 0.0);
        assert_eq!(winner.value, 100.0);
        assert_eq!(c.predict(0.0, None).unwrap(), 100.0);
    }

    #[test]
    fn insufficient_children_are_skipped() {
        let mut c = container(&[100.0, 100.0], 1);
        c.node_mut(1).unwrap().fail = Some(|| HorseError::insufficient("no data"));
        c.judge(0.0, 100.0).unwrap();
        assert!(c.hist_full(0));
        assert!(!c.hist_full(1));
        assert!(!c.hist_full_all());
    }

    #[test]
    fn hard_failures_propagate() {
        let mut c = container(&[100.0, 100.0], 1);
        c.node_mut(1).unwrap().fail = Some(|| HorseError::temporal("future"));
        assert!(matches!(c.judge(0.0, 100.0), Err(HorseError::Temporal { .. })));
        assert!(c.slots()[0].history().is_empty());
    }

    #[test]
    fn all_hot_children_failing_is_insufficient() {
        let mut c = container(&[100.0], 1);
        c.judge(0.0, 105.0).unwrap();
        c.node_mut(0).unwrap().fail = Some(|| HorseError::insufficient("gone"));
        assert!(c.predict(0.0, None).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn ranking_and_reset() {
        let mut c = container(&[80.0, 100.0, 95.0], 1);
        c.judge(0.0, 100.0).unwrap();
        assert_eq!(c.ranking(), vec![1, 2, 0]);
        c.reset(1);
        assert_eq!(c.ranking(), vec![2, 0, 1]);
        assert_eq!(c.winner_index(), Some(2));
    }

    #[test]
    fn parallel_matches_serial() {
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap());
        let mut serial = container(&[90.0, 95.0, 105.0, 120.0], 3);
        let mut parallel = container(&[90.0, 95.0, 105.0, 120.0], 3).with_pool(pool);
        assert!(parallel.is_parallel());
        for tv in [100.0, 101.0, 99.0, 102.0] {
            serial.judge(0.0, tv).unwrap();
            parallel.judge(0.0, tv).unwrap();
        }
        assert_eq!(serial.predict(0.0, None).unwrap(), parallel.predict(0.0, None).unwrap());
    }

    #[test]
    fn restore_history_recomputes_average() {
        let mut c = container(&[100.0], 2);
        c.restore_history(0, &[0.5, 0.1, 0.3]);
        assert_eq!(c.slots()[0].history().len(), 2);
        assert_relative_eq!(c.slots()[0].average().unwrap(), 0.2, epsilon = 1e-12);
    }
}
