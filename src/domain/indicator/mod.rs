//! Historical indicators.
//!
//! An [`Indicator`] is a pure function of a period over stored trades. `hist`
//! memoises results in a bounded in-process LRU and, for fixed periods, in the
//! persistent indicator store keyed by `(exchange, indicator id, period)`.
//! Composite indicators read their children through `hist` as well, so shared
//! children are computed once.

pub mod factory;
mod simple;
mod wilder;

use crate::domain::error::HorseError;
use crate::domain::period::{FixedPeriod, Period, PeriodKind};
use crate::domain::storage::StorageEngine;
use crate::domain::trade::Trade;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

pub use factory::{IndicatorFactory, IndicatorSet};

/// LRU capacity used when none is configured.
pub const DEFAULT_LRU_CAPACITY: usize = 256;

/// Number of linear-gradient blocks a smoothed gradient looks back over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmoothingBlocks {
    Six,
    Fourteen,
}

impl SmoothingBlocks {
    pub fn count(self) -> i64 {
        match self {
            SmoothingBlocks::Six => 6,
            SmoothingBlocks::Fourteen => 14,
        }
    }
}

/// Which periods an indicator can be evaluated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodRule {
    Any,
    FixedDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Dummy,
    MinTradePrice,
    MaxTradePrice,
    OpenTradePrice1Day,
    CloseTradePrice1Day,
    WeightedAvgPrice,
    WeightedAverageTrend,
    LinPriceTrend,
    SmoothedLinPriceGradient(SmoothingBlocks),
    PosDm1Day,
    NegDm1Day,
    TrueRange1Day,
    PosDi1Day,
    NegDi1Day,
    Adx1Day,
}

impl IndicatorKind {
    /// Stable id used as part of the persistent storage key.
    pub fn id(self) -> u32 {
        match self {
            IndicatorKind::Dummy => 0,
            IndicatorKind::MinTradePrice => 10,
            IndicatorKind::MaxTradePrice => 11,
            IndicatorKind::OpenTradePrice1Day => 20,
            IndicatorKind::CloseTradePrice1Day => 21,
            IndicatorKind::WeightedAvgPrice => 31,
            IndicatorKind::WeightedAverageTrend => 32,
            IndicatorKind::LinPriceTrend => 41,
            IndicatorKind::SmoothedLinPriceGradient(SmoothingBlocks::Fourteen) => 81,
            IndicatorKind::SmoothedLinPriceGradient(SmoothingBlocks::Six) => 86,
            IndicatorKind::PosDm1Day => 100,
            IndicatorKind::NegDm1Day => 150,
            IndicatorKind::TrueRange1Day => 201,
            IndicatorKind::PosDi1Day => 221,
            IndicatorKind::NegDi1Day => 231,
            IndicatorKind::Adx1Day => 241,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IndicatorKind::Dummy => "DummyIndicator",
            IndicatorKind::MinTradePrice => "MinTradePrice",
            IndicatorKind::MaxTradePrice => "MaxTradePrice",
            IndicatorKind::OpenTradePrice1Day => "OpenTradePrice_1Day",
            IndicatorKind::CloseTradePrice1Day => "CloseTradePrice_1Day",
            IndicatorKind::WeightedAvgPrice => "WeightedAvgPrice",
            IndicatorKind::WeightedAverageTrend => "WeightedAverageTrend",
            IndicatorKind::LinPriceTrend => "LinPriceTrend",
            IndicatorKind::SmoothedLinPriceGradient(SmoothingBlocks::Six) => {
                "SmoothedLinPriceGradient_6"
            }
            IndicatorKind::SmoothedLinPriceGradient(SmoothingBlocks::Fourteen) => {
                "SmoothedLinPriceGradient_14"
            }
            IndicatorKind::PosDm1Day => "PosDM_1Day",
            IndicatorKind::NegDm1Day => "NegDM_1Day",
            IndicatorKind::TrueRange1Day => "TrueRange_1Day",
            IndicatorKind::PosDi1Day => "PosDI_1Day",
            IndicatorKind::NegDi1Day => "NegDI_1Day",
            IndicatorKind::Adx1Day => "ADX_1Day",
        }
    }

    /// Declared arity, if the indicator checks it.
    pub fn field_count(self) -> Option<usize> {
        match self {
            IndicatorKind::WeightedAvgPrice => Some(1),
            IndicatorKind::WeightedAverageTrend => Some(2),
            IndicatorKind::LinPriceTrend => Some(3),
            IndicatorKind::SmoothedLinPriceGradient(_) => Some(2),
            _ => None,
        }
    }

    pub fn period_rule(self) -> PeriodRule {
        match self {
            IndicatorKind::OpenTradePrice1Day
            | IndicatorKind::CloseTradePrice1Day
            | IndicatorKind::PosDm1Day
            | IndicatorKind::NegDm1Day
            | IndicatorKind::TrueRange1Day
            | IndicatorKind::PosDi1Day
            | IndicatorKind::NegDi1Day
            | IndicatorKind::Adx1Day => PeriodRule::FixedDay,
            _ => PeriodRule::Any,
        }
    }

    /// Child indicators this one reads through `hist`.
    pub fn requirements(self) -> &'static [IndicatorKind] {
        match self {
            IndicatorKind::WeightedAverageTrend => &[IndicatorKind::WeightedAvgPrice],
            IndicatorKind::SmoothedLinPriceGradient(_) => &[IndicatorKind::LinPriceTrend],
            IndicatorKind::PosDm1Day | IndicatorKind::NegDm1Day => {
                &[IndicatorKind::MinTradePrice, IndicatorKind::MaxTradePrice]
            }
            IndicatorKind::TrueRange1Day => &[
                IndicatorKind::MinTradePrice,
                IndicatorKind::MaxTradePrice,
                IndicatorKind::CloseTradePrice1Day,
            ],
            IndicatorKind::PosDi1Day => &[IndicatorKind::PosDm1Day, IndicatorKind::TrueRange1Day],
            IndicatorKind::NegDi1Day => &[IndicatorKind::NegDm1Day, IndicatorKind::TrueRange1Day],
            IndicatorKind::Adx1Day => &[IndicatorKind::PosDi1Day, IndicatorKind::NegDi1Day],
            _ => &[],
        }
    }

    fn accepts(self, period: &Period) -> bool {
        match self.period_rule() {
            PeriodRule::Any => true,
            PeriodRule::FixedDay => {
                matches!(period, Period::Fixed(p) if p.kind() == PeriodKind::Day1)
            }
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

struct LruCache {
    capacity: usize,
    values: HashMap<FixedPeriod, Vec<f64>>,
    order: VecDeque<FixedPeriod>,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            values: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &FixedPeriod) -> Option<Vec<f64>> {
        let value = self.values.get(key)?.clone();
        self.touch(key);
        Some(value)
    }

    fn put(&mut self, key: FixedPeriod, value: Vec<f64>) {
        if self.values.insert(key, value).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.values.remove(&old);
            }
        }
    }

    fn touch(&mut self, key: &FixedPeriod) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(*key);
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

pub struct Indicator {
    kind: IndicatorKind,
    exchange_id: u32,
    storage: StorageEngine,
    children: Vec<Arc<Indicator>>,
    cache: Mutex<LruCache>,
}

impl Indicator {
    pub(crate) fn new(
        kind: IndicatorKind,
        exchange_id: u32,
        storage: StorageEngine,
        children: Vec<Arc<Indicator>>,
        lru_capacity: usize,
    ) -> Self {
        Self {
            kind,
            exchange_id,
            storage,
            children,
            cache: Mutex::new(LruCache::new(lru_capacity)),
        }
    }

    pub fn kind(&self) -> IndicatorKind {
        self.kind
    }

    pub fn exchange_id(&self) -> u32 {
        self.exchange_id
    }

    pub fn children(&self) -> &[Arc<Indicator>] {
        &self.children
    }

    /// Values for `period`, from the LRU, then the store (fixed periods
    /// only), then by calculation. Fixed-period results are written back to
    /// both.
    pub fn hist(&self, period: &Period) -> Result<Vec<f64>, HorseError> {
        let fixed = period.as_fixed();
        if let Some(p) = fixed {
            if let Some(values) = self.lock_cache().get(p) {
                return Ok(values);
            }
            if let Some(values) = self.storage.load_indicator(self.exchange_id, self.kind.id(), p)? {
                self.check_arity(&values, "stored")?;
                self.lock_cache().put(*p, values.clone());
                return Ok(values);
            }
        }

        let values = self.calculate(period)?;

        if let Some(p) = fixed {
            self.lock_cache().put(*p, values.clone());
            self.storage
                .store_indicator(self.exchange_id, self.kind.id(), p, &values)?;
        }
        Ok(values)
    }

    /// Compute values for `period` without consulting or filling any cache.
    pub fn calculate(&self, period: &Period) -> Result<Vec<f64>, HorseError> {
        if !self.kind.accepts(period) {
            return Err(HorseError::InvalidPeriod {
                reason: format!("{} cannot be evaluated over {period}", self.kind),
            });
        }
        let values = match self.kind {
            IndicatorKind::Dummy => simple::dummy(),
            IndicatorKind::MinTradePrice => simple::min_trade_price(self, period)?,
            IndicatorKind::MaxTradePrice => simple::max_trade_price(self, period)?,
            IndicatorKind::OpenTradePrice1Day => simple::open_trade_price(self, period)?,
            IndicatorKind::CloseTradePrice1Day => simple::close_trade_price(self, period)?,
            IndicatorKind::WeightedAvgPrice => simple::weighted_avg_price(self, period)?,
            IndicatorKind::WeightedAverageTrend => simple::weighted_average_trend(self, period)?,
            IndicatorKind::LinPriceTrend => simple::lin_price_trend(self, period)?,
            IndicatorKind::SmoothedLinPriceGradient(blocks) => {
                simple::smoothed_lin_price_gradient(self, period, blocks)?
            }
            IndicatorKind::PosDm1Day => wilder::pos_dm(self, period)?,
            IndicatorKind::NegDm1Day => wilder::neg_dm(self, period)?,
            IndicatorKind::TrueRange1Day => wilder::true_range(self, period)?,
            IndicatorKind::PosDi1Day => wilder::pos_di(self, period)?,
            IndicatorKind::NegDi1Day => wilder::neg_di(self, period)?,
            IndicatorKind::Adx1Day => wilder::adx(self, period)?,
        };
        self.check_arity(&values, "calculated")?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(HorseError::MalformedIndicator {
                indicator: self.kind.name().to_string(),
                reason: format!("non-finite result {values:?}"),
            });
        }
        Ok(values)
    }

    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    pub(crate) fn trades(&self, period: &Period) -> Result<Vec<Trade>, HorseError> {
        self.storage.fetch(self.exchange_id, period)
    }

    pub(crate) fn child(&self, kind: IndicatorKind) -> Result<&Arc<Indicator>, HorseError> {
        self.children
            .iter()
            .find(|c| c.kind == kind)
            .ok_or_else(|| HorseError::MalformedIndicator {
                indicator: self.kind.name().to_string(),
                reason: format!("child {kind} was not resolved"),
            })
    }

    /// First field of a child's value for `period`.
    pub(crate) fn child_value(&self, kind: IndicatorKind, period: &Period) -> Result<f64, HorseError> {
        let values = self.child(kind)?.hist(period)?;
        values
            .first()
            .copied()
            .ok_or_else(|| HorseError::MalformedIndicator {
                indicator: kind.name().to_string(),
                reason: "empty result".to_string(),
            })
    }

    fn check_arity(&self, values: &[f64], origin: &str) -> Result<(), HorseError> {
        match self.kind.field_count() {
            Some(n) if values.len() != n => Err(HorseError::MalformedIndicator {
                indicator: self.kind.name().to_string(),
                reason: format!("{origin} value has {} fields, expected {n}", values.len()),
            }),
            _ => Ok(()),
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indicator")
            .field("kind", &self.kind)
            .field("exchange_id", &self.exchange_id)
            .field("children", &self.children.iter().map(|c| c.kind).collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} ({})>", self.kind.name(), self.kind.id())
    }
}
