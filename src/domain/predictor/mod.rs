//! Predictors: pure forecasting functions bound to coefficient values.
//!
//! A [`PredictorModel`] declares its coefficient domains and the indicators it
//! reads. A [`Predictor`] is one model bound to concrete values. Forecasts see
//! history only through a [`ForecastInput`], which refuses any lookup past the
//! horizon timestamp, so look-ahead fails loudly instead of producing a
//! plausible number.

pub mod factory;
pub mod simple;
pub mod toy;

use crate::domain::clock::printable_ts;
use crate::domain::coefficient::{CoefValue, Coefficient, CoefficientSet};
use crate::domain::error::HorseError;
use crate::domain::indicator::{IndicatorKind, IndicatorSet};
use crate::domain::period::Period;
use crate::domain::storage::StorageEngine;
use crate::domain::trade::Trade;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

pub use factory::PredictorFactory;

pub trait PredictorModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Every coefficient the model is parameterised by, with its domain.
    fn coefficients(&self) -> BTreeMap<&'static str, Coefficient>;

    fn required_indicators(&self) -> &'static [IndicatorKind] {
        &[]
    }

    /// Price forecast for `ts` using only data up to `input.horizon_ts()`.
    fn forecast(
        &self,
        input: &ForecastInput<'_>,
        coefficients: &CoefficientSet,
        ts: f64,
    ) -> Result<f64, HorseError>;
}

/// Every model known to the registry.
pub fn all_models() -> Vec<Arc<dyn PredictorModel>> {
    vec![
        Arc::new(simple::PredictorDummy),
        Arc::new(toy::ToyPredictor),
        Arc::new(toy::ToyPredictor2),
        Arc::new(simple::LinGradient),
        Arc::new(simple::SmoothedLinGradient),
        Arc::new(simple::WMeanGradient),
        Arc::new(simple::PatternTimePeriod),
    ]
}

pub fn model_by_name(name: &str) -> Option<Arc<dyn PredictorModel>> {
    all_models().into_iter().find(|m| m.name() == name)
}

/// Read-only view of history capped at a horizon timestamp.
pub struct ForecastInput<'a> {
    indicators: &'a IndicatorSet,
    storage: &'a StorageEngine,
    exchange_id: u32,
    horizon_ts: f64,
}

impl<'a> ForecastInput<'a> {
    pub fn new(
        indicators: &'a IndicatorSet,
        storage: &'a StorageEngine,
        exchange_id: u32,
        horizon_ts: f64,
    ) -> Self {
        Self {
            indicators,
            storage,
            exchange_id,
            horizon_ts,
        }
    }

    pub fn horizon_ts(&self) -> f64 {
        self.horizon_ts
    }

    /// Values of `kind` for a period that must end at or before the horizon.
    pub fn indicator(&self, kind: IndicatorKind, period: &Period) -> Result<Vec<f64>, HorseError> {
        if period.rhs_ts() > self.horizon_ts {
            return Err(HorseError::temporal(format!(
                "{kind} over {period} would look past horizon {}",
                printable_ts(self.horizon_ts)
            )));
        }
        let indicator = self.indicators.get(kind).ok_or_else(|| {
            HorseError::MalformedIndicator {
                indicator: kind.name().to_string(),
                reason: "not among the predictor's required indicators".to_string(),
            }
        })?;
        indicator.hist(period)
    }

    /// The newest trade at or before `before_ts`, which must not be after the
    /// horizon.
    pub fn trade_before(&self, before_ts: f64) -> Result<Trade, HorseError> {
        if before_ts > self.horizon_ts {
            return Err(HorseError::temporal(format!(
                "trade lookup at {} is past horizon {}",
                printable_ts(before_ts),
                printable_ts(self.horizon_ts)
            )));
        }
        self.storage.fetch_one(self.exchange_id, before_ts)
    }

    /// Trades inside a period that must end at or before the horizon.
    pub fn trades(&self, period: &Period) -> Result<Vec<Trade>, HorseError> {
        if period.rhs_ts() > self.horizon_ts {
            return Err(HorseError::temporal(format!(
                "trades over {period} would look past horizon {}",
                printable_ts(self.horizon_ts)
            )));
        }
        self.storage.fetch(self.exchange_id, period)
    }
}

pub struct Predictor {
    model: Arc<dyn PredictorModel>,
    coefficients: CoefficientSet,
    indicators: IndicatorSet,
    storage: StorageEngine,
    exchange_id: u32,
}

impl Predictor {
    /// Bind `model` to `coefficients`, which must name exactly the model's
    /// coefficients with values inside their domains.
    pub fn new(
        model: Arc<dyn PredictorModel>,
        coefficients: CoefficientSet,
        indicators: IndicatorSet,
        storage: StorageEngine,
        exchange_id: u32,
    ) -> Result<Self, HorseError> {
        let domains = model.coefficients();
        let expected: BTreeSet<&str> = domains.keys().copied().collect();
        let supplied: BTreeSet<&str> = coefficients.names().collect();
        if expected != supplied {
            return Err(HorseError::InvalidCoefficients {
                reason: format!(
                    "{} takes {:?}, got {:?}",
                    model.name(),
                    expected,
                    supplied
                ),
            });
        }
        for (name, domain) in &domains {
            domain.validate(name)?;
            let value = coefficients.get(name)?;
            if !domain.admits(&value) {
                return Err(HorseError::InvalidCoefficients {
                    reason: format!("{}: {value} is outside the domain of '{name}'", model.name()),
                });
            }
        }
        Ok(Self {
            model,
            coefficients,
            indicators,
            storage,
            exchange_id,
        })
    }

    pub fn model(&self) -> &Arc<dyn PredictorModel> {
        &self.model
    }

    pub fn name(&self) -> &'static str {
        self.model.name()
    }

    pub fn coefficients(&self) -> &CoefficientSet {
        &self.coefficients
    }

    /// Forecast for `ts` using data up to `horizon_ts`, which defaults to now.
    pub fn predict(&self, ts: f64, horizon_ts: Option<f64>) -> Result<f64, HorseError> {
        let horizon_ts = horizon_ts.unwrap_or_else(|| self.storage.clock().time());
        let input = ForecastInput::new(&self.indicators, &self.storage, self.exchange_id, horizon_ts);
        self.model.forecast(&input, &self.coefficients, ts)
    }

    /// Replace the named coefficient values, leaving the rest untouched. Every
    /// name must belong to the model.
    pub fn mutate(&mut self, updates: &BTreeMap<String, CoefValue>) -> Result<(), HorseError> {
        let domains = self.model.coefficients();
        for (name, value) in updates {
            let domain = domains.get(name.as_str()).ok_or_else(|| HorseError::InvalidCoefficients {
                reason: format!("{} has no coefficient '{name}'", self.model.name()),
            })?;
            if !domain.admits(value) {
                return Err(HorseError::InvalidCoefficients {
                    reason: format!("{}: {value} is outside the domain of '{name}'", self.model.name()),
                });
            }
        }
        for (name, value) in updates {
            self.coefficients.set(name, *value);
        }
        Ok(())
    }
}

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor")
            .field("model", &self.model.name())
            .field("coefficients", &self.coefficients)
            .finish()
    }
}

impl fmt::Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} - bound: {}>", self.model.name(), self.coefficients)
    }
}
