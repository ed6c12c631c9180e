//! Toy models with known answers, used to exercise the ensemble.

use super::{ForecastInput, PredictorModel};
use crate::domain::coefficient::{Coefficient, CoefficientSet};
use crate::domain::error::HorseError;
use crate::domain::indicator::IndicatorKind;
use std::collections::BTreeMap;

/// Forecasts its single coefficient. Requires the dummy indicator so that
/// indicator wiring is exercised too.
#[derive(Debug, Clone, Copy)]
pub struct ToyPredictor;

impl PredictorModel for ToyPredictor {
    fn name(&self) -> &'static str {
        "ToyPredictor"
    }

    fn coefficients(&self) -> BTreeMap<&'static str, Coefficient> {
        BTreeMap::from([("n_to_return", Coefficient::Int { min: 50, max: 150 })])
    }

    fn required_indicators(&self) -> &'static [IndicatorKind] {
        &[IndicatorKind::Dummy]
    }

    fn forecast(
        &self,
        _input: &ForecastInput<'_>,
        coefficients: &CoefficientSet,
        _ts: f64,
    ) -> Result<f64, HorseError> {
        coefficients.float("n_to_return")
    }
}

/// Forecasts the product of two coefficients.
#[derive(Debug, Clone, Copy)]
pub struct ToyPredictor2;

impl PredictorModel for ToyPredictor2 {
    fn name(&self) -> &'static str {
        "ToyPredictor2"
    }

    fn coefficients(&self) -> BTreeMap<&'static str, Coefficient> {
        BTreeMap::from([
            ("cf1", Coefficient::Int { min: 50, max: 150 }),
            ("cf2", Coefficient::Float { min: 0.1, max: 100.0 }),
        ])
    }

    fn forecast(
        &self,
        _input: &ForecastInput<'_>,
        coefficients: &CoefficientSet,
        _ts: f64,
    ) -> Result<f64, HorseError> {
        Ok(coefficients.float("cf1")? * coefficients.float("cf2")?)
    }
}
