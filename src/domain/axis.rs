//! One coefficient of a predictor class, searched by evolving sibling values.
//!
//! An [`Axis`] binds some coefficients of a model and varies exactly one, its
//! *target*. Each child slot holds one value of the target: a nested axis while
//! other coefficients remain unbound, a concrete predictor at the last level.
//! The tree shape is fixed at construction; mutation only rewrites slot values.

use crate::domain::coefficient::{Binding, CoefValue, Coefficient, CoefficientSet};
use crate::domain::container::{wrongness, Container, ContainerSettings, Contestant, Scored};
use crate::domain::error::HorseError;
use crate::domain::predictor::{Predictor, PredictorFactory, PredictorModel};
use crate::domain::snapshot::{SlotSnapshot, TreeSnapshot};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

pub const DEFAULT_WORKER_THREADS: usize = 4;
pub const DEFAULT_RANDOM_REPLACEMENTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSettings {
    pub container: ContainerSettings,
    /// Size of the pool owned by each level-0 axis.
    pub worker_threads: usize,
    /// Slots given a fresh random value per mutation, after the worst slot
    /// takes the midpoint of the two best.
    pub random_replacements: usize,
}

impl Default for AxisSettings {
    fn default() -> Self {
        Self {
            container: ContainerSettings::default(),
            worker_threads: DEFAULT_WORKER_THREADS,
            random_replacements: DEFAULT_RANDOM_REPLACEMENTS,
        }
    }
}

/// A child slot, decided once at construction.
#[derive(Debug)]
pub enum Node {
    Branch(Box<Axis>),
    Leaf(Predictor),
}

impl Node {
    fn mutate(&mut self, coefficients: &BTreeMap<String, CoefValue>) -> Result<(), HorseError> {
        match self {
            Node::Branch(axis) => axis.mutate(coefficients),
            Node::Leaf(predictor) => predictor.mutate(coefficients),
        }
    }
}

impl Contestant for Node {
    fn score(&mut self, ts: f64, true_value: f64, horizon_ts: f64) -> Result<f64, HorseError> {
        match self {
            Node::Branch(axis) => axis.score(ts, true_value, horizon_ts),
            Node::Leaf(predictor) => {
                let forecast = predictor.predict(ts, Some(horizon_ts))?;
                wrongness(true_value, forecast).ok_or_else(|| {
                    HorseError::insufficient(format!("{predictor} forecast {forecast} can't be scored"))
                })
            }
        }
    }

    fn predict(&self, ts: f64, horizon_ts: Option<f64>) -> Result<f64, HorseError> {
        match self {
            Node::Branch(axis) => axis.predict(ts, horizon_ts),
            Node::Leaf(predictor) => predictor.predict(ts, horizon_ts),
        }
    }

    fn preroll(&mut self, ts: f64, true_value: f64) -> Result<(), HorseError> {
        match self {
            Node::Branch(axis) => axis.preroll(ts, true_value),
            Node::Leaf(_) => Ok(()),
        }
    }

    fn deep_hist_full(&self) -> bool {
        match self {
            Node::Branch(axis) => axis.hist_full_all(),
            Node::Leaf(_) => true,
        }
    }

    fn label(&self) -> String {
        match self {
            Node::Branch(axis) => axis.to_string(),
            Node::Leaf(predictor) => predictor.to_string(),
        }
    }
}

pub struct Axis {
    model: Arc<dyn PredictorModel>,
    factory: PredictorFactory,
    domain: Coefficient,
    binding: Binding,
    target: String,
    level: usize,
    values: Vec<CoefValue>,
    container: Container<Node>,
    rng: StdRng,
    settings: AxisSettings,
}

impl Axis {
    /// Top of a tree for `model` with nothing bound. The first target is
    /// drawn at random from the model's coefficients.
    pub fn root(
        model: Arc<dyn PredictorModel>,
        factory: PredictorFactory,
        settings: AxisSettings,
        seed: u64,
    ) -> Result<Self, HorseError> {
        let binding: Binding = model
            .coefficients()
            .keys()
            .map(|name| (name.to_string(), None))
            .collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let names: Vec<&String> = binding.keys().collect();
        let target = names
            .choose(&mut rng)
            .map(|name| name.to_string())
            .ok_or_else(|| HorseError::InvalidCoefficients {
                reason: format!("{} has no coefficients to search", model.name()),
            })?;
        Self::build(model, factory, binding, target, 0, settings, rng)
    }

    /// An axis over `binding`, which must name every coefficient of `model`
    /// and leave at least one unbound. `target` defaults to the smallest
    /// unbound name.
    pub fn new(
        model: Arc<dyn PredictorModel>,
        factory: PredictorFactory,
        binding: Binding,
        target: Option<&str>,
        level: usize,
        settings: AxisSettings,
        seed: u64,
    ) -> Result<Self, HorseError> {
        let declared: Vec<&str> = model.coefficients().keys().copied().collect();
        let supplied: Vec<&str> = binding.keys().map(String::as_str).collect();
        if declared != supplied {
            return Err(HorseError::InvalidCoefficients {
                reason: format!("{} takes {declared:?}, got {supplied:?}", model.name()),
            });
        }
        let target = match target {
            Some(name) => name.to_string(),
            None => first_unbound(&binding).ok_or_else(|| HorseError::InvalidCoefficients {
                reason: format!("every coefficient of {} is already bound", model.name()),
            })?,
        };
        match binding.get(&target) {
            Some(None) => {}
            Some(Some(value)) => {
                return Err(HorseError::InvalidCoefficients {
                    reason: format!("target '{target}' is already bound to {value}"),
                });
            }
            None => {
                return Err(HorseError::InvalidCoefficients {
                    reason: format!("{} has no coefficient '{target}'", model.name()),
                });
            }
        }
        Self::build(model, factory, binding, target, level, settings, StdRng::seed_from_u64(seed))
    }

    fn build(
        model: Arc<dyn PredictorModel>,
        factory: PredictorFactory,
        binding: Binding,
        target: String,
        level: usize,
        settings: AxisSettings,
        mut rng: StdRng,
    ) -> Result<Self, HorseError> {
        let domain = model
            .coefficients()
            .remove(target.as_str())
            .ok_or_else(|| HorseError::InvalidCoefficients {
                reason: format!("{} has no coefficient '{target}'", model.name()),
            })?;
        domain.validate(&target)?;

        let mut container = Container::new(settings.container);
        if level == 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(settings.worker_threads.max(1))
                .thread_name(|i| format!("axis-worker-{i}"))
                .build()
                .map_err(|e| HorseError::InvalidArgument {
                    reason: format!("failed to start axis workers: {e}"),
                })?;
            container = container.with_pool(Arc::new(pool));
        }

        let values = domain.seed();
        for value in &values {
            let mut child_binding = binding.clone();
            child_binding.insert(target.clone(), Some(*value));
            let node = match first_unbound(&child_binding) {
                None => Node::Leaf(
                    factory.create(model.clone(), CoefficientSet::from_binding(&child_binding)?)?,
                ),
                Some(next) => Node::Branch(Box::new(Self::build(
                    model.clone(),
                    factory.clone(),
                    child_binding,
                    next,
                    level + 1,
                    settings,
                    StdRng::seed_from_u64(rng.next_u64()),
                )?)),
            };
            container.push(node);
        }

        let axis = Self {
            model,
            factory,
            domain,
            binding,
            target,
            level,
            values,
            container,
            rng,
            settings,
        };
        if level == 0 {
            tracing::info!(axis = %axis, slots = axis.values.len(), "axis tree built");
        }
        Ok(axis)
    }

    pub fn model(&self) -> &Arc<dyn PredictorModel> {
        &self.model
    }

    pub fn factory(&self) -> &PredictorFactory {
        &self.factory
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Value of the target in each slot.
    pub fn values(&self) -> &[CoefValue] {
        &self.values
    }

    pub fn slots(&self) -> &[Scored<Node>] {
        self.container.slots()
    }

    pub fn is_parallel(&self) -> bool {
        self.container.is_parallel()
    }

    /// Coefficients fixed for this whole subtree.
    pub fn bound(&self) -> BTreeMap<String, CoefValue> {
        self.binding
            .iter()
            .filter_map(|(name, value)| value.map(|v| (name.clone(), v)))
            .collect()
    }

    /// Coefficients searched at this level and below, the target included.
    pub fn unbound(&self) -> Vec<&str> {
        self.binding
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn judge(&mut self, ts: f64, true_value: f64) -> Result<(), HorseError> {
        self.container.judge(ts, true_value)
    }

    pub fn predict(&self, ts: f64, horizon_ts: Option<f64>) -> Result<f64, HorseError> {
        self.container.predict(ts, horizon_ts)
    }

    pub fn winner(&self) -> Result<(&Node, f64), HorseError> {
        self.container.winner()
    }

    /// The best predictor of the subtree, following winners down to a leaf,
    /// with the wrongness of this axis's winning slot.
    pub fn champion(&self) -> Result<(&Predictor, f64), HorseError> {
        let (node, score) = self.winner()?;
        match node {
            Node::Leaf(predictor) => Ok((predictor, score)),
            Node::Branch(axis) => axis.champion().map(|(p, _)| (p, score)),
        }
    }

    pub fn preroll(&mut self, ts: f64, true_value: f64) -> Result<(), HorseError> {
        self.container.preroll(ts, true_value)
    }

    /// Every slot here and below is hot.
    pub fn hist_full_all(&self) -> bool {
        self.container.deep_hist_full_all()
    }

    /// Evolve the target and pass bound-coefficient updates from ancestors
    /// down to every slot.
    ///
    /// Once all slots are hot the worst slot takes the midpoint of the two
    /// best, and the next worst get random values; each rewritten slot goes
    /// cold. Enumerated targets are never rewritten.
    pub fn mutate(&mut self, coefficients: &BTreeMap<String, CoefValue>) -> Result<(), HorseError> {
        let relay = self.absorb(coefficients);
        let mut assigned = vec![false; self.values.len()];

        if self.domain.is_mutable() && self.values.len() >= 3 && self.container.hist_full_all() {
            for (slot, value) in self.plan_replacements() {
                let mut update = relay.clone();
                update.insert(self.target.clone(), value);
                if let Some(node) = self.container.node_mut(slot) {
                    node.mutate(&update)?;
                }
                tracing::debug!(
                    axis = %self,
                    slot,
                    from = %self.values[slot],
                    to = %value,
                    "slot replaced"
                );
                self.values[slot] = value;
                self.container.reset(slot);
                assigned[slot] = true;
            }
        }

        if !relay.is_empty() {
            for (slot, node) in self.container.nodes_mut().enumerate() {
                if !assigned[slot] {
                    node.mutate(&relay)?;
                }
            }
        }
        Ok(())
    }

    /// Take on updates for coefficients bound here; anything else is dropped.
    fn absorb(&mut self, coefficients: &BTreeMap<String, CoefValue>) -> BTreeMap<String, CoefValue> {
        let mut relay = BTreeMap::new();
        for (name, value) in coefficients {
            if matches!(self.binding.get(name), Some(Some(_))) {
                self.binding.insert(name.clone(), Some(*value));
                relay.insert(name.clone(), *value);
            } else {
                tracing::warn!(
                    axis = %self,
                    coefficient = %name,
                    "ignoring update for a coefficient not bound here"
                );
            }
        }
        relay
    }

    fn plan_replacements(&mut self) -> Vec<(usize, CoefValue)> {
        let ranking = self.container.ranking();
        let n = ranking.len();
        let mut plan = Vec::with_capacity(1 + self.settings.random_replacements);
        if let Some(mid) = self
            .domain
            .midpoint(&self.values[ranking[0]], &self.values[ranking[1]])
        {
            plan.push((ranking[n - 1], mid));
        }
        // the two leaders are never replaced
        let explore = self.settings.random_replacements.min(n.saturating_sub(3));
        for k in 0..explore {
            if let Some(value) = self.domain.random(&mut self.rng) {
                plan.push((ranking[n - 2 - k], value));
            }
        }
        plan
    }

    /// Indented dump of the subtree: one line per slot with its value,
    /// history fill and average wrongness.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out, 0);
        out
    }

    fn describe_into(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        let _ = writeln!(out, "{pad}{self}");
        let capacity = self.container.settings().wrongness_hist;
        for (slot, (value, scored)) in self.values.iter().zip(self.container.slots()).enumerate() {
            let avg = match scored.average() {
                Some(a) => format!("{a:.6}"),
                None => "-".to_string(),
            };
            let _ = writeln!(
                out,
                "{pad}  [{slot}] {}={value} wrongness={avg} hist={}/{capacity}",
                self.target,
                scored.history().len()
            );
            if let Node::Branch(axis) = scored.node() {
                axis.describe_into(out, depth + 2);
            }
        }
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            model: self.model.name().to_string(),
            target: self.target.clone(),
            bound: self.bound(),
            slots: self
                .values
                .iter()
                .zip(self.container.slots())
                .map(|(value, scored)| SlotSnapshot {
                    value: *value,
                    history: scored.history().iter().copied().collect(),
                    child: match scored.node() {
                        Node::Branch(axis) => Some(axis.snapshot()),
                        Node::Leaf(_) => None,
                    },
                })
                .collect(),
        }
    }

    /// Load slot values and histories from `snapshot`. The shape is checked
    /// in full before anything changes.
    pub fn restore(&mut self, snapshot: &TreeSnapshot) -> Result<(), HorseError> {
        self.check_shape(snapshot)?;
        self.apply(snapshot)
    }

    pub(crate) fn check_shape(&self, snapshot: &TreeSnapshot) -> Result<(), HorseError> {
        let mismatch = |reason: String| HorseError::Snapshot {
            reason: format!("{self}: {reason}"),
        };
        if snapshot.model != self.model.name() {
            return Err(mismatch(format!("snapshot is for {}", snapshot.model)));
        }
        if snapshot.target != self.target {
            return Err(mismatch(format!("snapshot searches '{}'", snapshot.target)));
        }
        if snapshot.slots.len() != self.values.len() {
            return Err(mismatch(format!(
                "snapshot has {} slots, tree has {}",
                snapshot.slots.len(),
                self.values.len()
            )));
        }
        for (slot, (saved, scored)) in snapshot.slots.iter().zip(self.container.slots()).enumerate() {
            if !self.domain.admits(&saved.value) {
                return Err(mismatch(format!("slot {slot} value {} is outside the domain", saved.value)));
            }
            match (scored.node(), &saved.child) {
                (Node::Branch(axis), Some(child)) => axis.check_shape(child)?,
                (Node::Leaf(_), None) => {}
                _ => return Err(mismatch(format!("slot {slot} has a different depth"))),
            }
        }
        Ok(())
    }

    fn apply(&mut self, snapshot: &TreeSnapshot) -> Result<(), HorseError> {
        for (slot, saved) in snapshot.slots.iter().enumerate() {
            if saved.value != self.values[slot] {
                let update = BTreeMap::from([(self.target.clone(), saved.value)]);
                if let Some(node) = self.container.node_mut(slot) {
                    node.mutate(&update)?;
                }
                self.values[slot] = saved.value;
            }
            if let (Some(Node::Branch(axis)), Some(child)) =
                (self.container.node_mut(slot), &saved.child)
            {
                axis.apply(child)?;
            }
            self.container.restore_history(slot, &saved.history);
        }
        Ok(())
    }
}

impl Contestant for Axis {
    /// The wrongness of whichever slot is currently winning.
    fn score(&mut self, ts: f64, true_value: f64, _horizon_ts: f64) -> Result<f64, HorseError> {
        self.judge(ts, true_value)?;
        self.winner().map(|(_, score)| score)
    }

    fn predict(&self, ts: f64, horizon_ts: Option<f64>) -> Result<f64, HorseError> {
        Axis::predict(self, ts, horizon_ts)
    }

    fn preroll(&mut self, ts: f64, true_value: f64) -> Result<(), HorseError> {
        Axis::preroll(self, ts, true_value)
    }

    fn deep_hist_full(&self) -> bool {
        self.hist_full_all()
    }

    fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = self.bound();
        let bound = if bound.is_empty() {
            "-".to_string()
        } else {
            bound
                .iter()
                .map(|(k, v)| format!("{k}:{v}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "<Axis {} mutating '{}', bound: {bound}>",
            self.model.name(),
            self.target
        )
    }
}

impl fmt::Debug for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Axis")
            .field("model", &self.model.name())
            .field("target", &self.target)
            .field("level", &self.level)
            .field("values", &self.values)
            .finish()
    }
}

fn first_unbound(binding: &Binding) -> Option<String> {
    binding
        .iter()
        .find(|(_, value)| value.is_none())
        .map(|(name, _)| name.clone())
}
