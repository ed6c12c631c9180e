//! Trend-following and pattern models.

use super::{ForecastInput, PredictorModel};
use crate::domain::coefficient::{CoefValue, Coefficient, CoefficientSet};
use crate::domain::error::HorseError;
use crate::domain::indicator::{IndicatorKind, SmoothingBlocks};
use crate::domain::period::{Anchor, Period, PeriodKind, PeriodSpec};
use std::collections::BTreeMap;

const PERIOD_CHOICES: [PeriodSpec; 6] = [
    PeriodSpec::new(PeriodKind::Hour12, Anchor::HourLhs),
    PeriodSpec::new(PeriodKind::Hour6, Anchor::HourLhs),
    PeriodSpec::new(PeriodKind::Hour3, Anchor::HourLhs),
    PeriodSpec::new(PeriodKind::Hour1, Anchor::TenMinLhs),
    PeriodSpec::new(PeriodKind::Min30, Anchor::TenMinLhs),
    PeriodSpec::new(PeriodKind::Min15, Anchor::Calendar),
];

fn period_type() -> Coefficient {
    Coefficient::Range(PERIOD_CHOICES.iter().copied().map(CoefValue::Period).collect())
}

/// Extrapolate `offset + (ts - lhs) * gradient` from the last whole period
/// before the horizon, reading `(offset, gradient)` from the indicator at the
/// given field positions.
fn extrapolate(
    input: &ForecastInput<'_>,
    coefficients: &CoefficientSet,
    ts: f64,
    kind: IndicatorKind,
    offset_field: usize,
    gradient_field: usize,
) -> Result<f64, HorseError> {
    let spec = coefficients.period("period_type")?;
    let period = spec.at(input.horizon_ts())? - 1;
    let values = input.indicator(kind, &Period::Fixed(period))?;
    let field = |i: usize| {
        values.get(i).copied().ok_or_else(|| HorseError::MalformedIndicator {
            indicator: kind.name().to_string(),
            reason: format!("missing field {i}"),
        })
    };
    let offset = field(offset_field)?;
    let gradient = field(gradient_field)?;
    Ok(offset + (ts - period.lhs_ts() as f64) * gradient)
}

/// Always forecasts 100. Used to test container mechanics.
#[derive(Debug, Clone, Copy)]
pub struct PredictorDummy;

impl PredictorModel for PredictorDummy {
    fn name(&self) -> &'static str {
        "PredictorDummy"
    }

    fn coefficients(&self) -> BTreeMap<&'static str, Coefficient> {
        BTreeMap::from([
            ("cf1", Coefficient::Int { min: 3, max: 20 }),
            (
                "cf2",
                Coefficient::Range(vec![CoefValue::Int(1), CoefValue::Int(2), CoefValue::Int(3)]),
            ),
        ])
    }

    fn forecast(
        &self,
        _input: &ForecastInput<'_>,
        _coefficients: &CoefficientSet,
        _ts: f64,
    ) -> Result<f64, HorseError> {
        Ok(100.0)
    }
}

/// Linear regression of the previous period's prices.
#[derive(Debug, Clone, Copy)]
pub struct LinGradient;

impl PredictorModel for LinGradient {
    fn name(&self) -> &'static str {
        "LinGradient"
    }

    fn coefficients(&self) -> BTreeMap<&'static str, Coefficient> {
        BTreeMap::from([("period_type", period_type())])
    }

    fn required_indicators(&self) -> &'static [IndicatorKind] {
        &[IndicatorKind::LinPriceTrend]
    }

    fn forecast(
        &self,
        input: &ForecastInput<'_>,
        coefficients: &CoefficientSet,
        ts: f64,
    ) -> Result<f64, HorseError> {
        // LinPriceTrend is (gradient, offset, stdev)
        extrapolate(input, coefficients, ts, IndicatorKind::LinPriceTrend, 1, 0)
    }
}

/// Exponentially smoothed gradient over the last six periods.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedLinGradient;

impl PredictorModel for SmoothedLinGradient {
    fn name(&self) -> &'static str {
        "SmoothedLinGradient"
    }

    fn coefficients(&self) -> BTreeMap<&'static str, Coefficient> {
        BTreeMap::from([("period_type", period_type())])
    }

    fn required_indicators(&self) -> &'static [IndicatorKind] {
        &[IndicatorKind::SmoothedLinPriceGradient(SmoothingBlocks::Six)]
    }

    fn forecast(
        &self,
        input: &ForecastInput<'_>,
        coefficients: &CoefficientSet,
        ts: f64,
    ) -> Result<f64, HorseError> {
        extrapolate(
            input,
            coefficients,
            ts,
            IndicatorKind::SmoothedLinPriceGradient(SmoothingBlocks::Six),
            0,
            1,
        )
    }
}

/// Change in volume-weighted mean price between consecutive periods.
#[derive(Debug, Clone, Copy)]
pub struct WMeanGradient;

impl PredictorModel for WMeanGradient {
    fn name(&self) -> &'static str {
        "WMeanGradient"
    }

    fn coefficients(&self) -> BTreeMap<&'static str, Coefficient> {
        BTreeMap::from([("period_type", period_type())])
    }

    fn required_indicators(&self) -> &'static [IndicatorKind] {
        &[IndicatorKind::WeightedAverageTrend]
    }

    fn forecast(
        &self,
        input: &ForecastInput<'_>,
        coefficients: &CoefficientSet,
        ts: f64,
    ) -> Result<f64, HorseError> {
        extrapolate(input, coefficients, ts, IndicatorKind::WeightedAverageTrend, 0, 1)
    }
}

/// Assumes the market repeats itself every `period_sec` seconds, give or take
/// `delta`.
#[derive(Debug, Clone, Copy)]
pub struct PatternTimePeriod;

impl PredictorModel for PatternTimePeriod {
    fn name(&self) -> &'static str {
        "PatternTimePeriod"
    }

    fn coefficients(&self) -> BTreeMap<&'static str, Coefficient> {
        BTreeMap::from([
            ("period_sec", Coefficient::Int { min: 30 * 60 + 5, max: 12 * 60 * 60 }),
            ("delta", Coefficient::Float { min: -100.0, max: 100.0 }),
        ])
    }

    fn forecast(
        &self,
        input: &ForecastInput<'_>,
        coefficients: &CoefficientSet,
        ts: f64,
    ) -> Result<f64, HorseError> {
        let check_ts = ts - coefficients.float("period_sec")?;
        if check_ts > input.horizon_ts() {
            return Err(HorseError::insufficient(format!(
                "pattern lookback {check_ts} is beyond the horizon"
            )));
        }
        let trade = input.trade_before(check_ts)?;
        Ok(trade.price + coefficients.float("delta")?)
    }
}
