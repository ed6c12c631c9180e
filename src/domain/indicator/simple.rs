//! Price indicators computed directly from trades in a window.

use super::{Indicator, IndicatorKind, SmoothingBlocks};
use crate::domain::error::HorseError;
use crate::domain::indicator_helpers::{
    exponential_smooth, linear_regression, std_dev, weighted_avg_and_std,
};
use crate::domain::period::Period;
use crate::domain::trade::Trade;

const SMOOTHING_ALPHA: f64 = 0.5;

fn non_empty(trades: Vec<Trade>, period: &Period) -> Result<Vec<Trade>, HorseError> {
    if trades.is_empty() {
        return Err(HorseError::insufficient(format!("no trades in {period}")));
    }
    Ok(trades)
}

pub(super) fn dummy() -> Vec<f64> {
    vec![66.66]
}

pub(super) fn min_trade_price(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let trades = non_empty(ind.trades(period)?, period)?;
    let min = trades.iter().map(|t| t.price).fold(f64::INFINITY, f64::min);
    Ok(vec![min])
}

pub(super) fn max_trade_price(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let trades = non_empty(ind.trades(period)?, period)?;
    let max = trades.iter().map(|t| t.price).fold(f64::NEG_INFINITY, f64::max);
    Ok(vec![max])
}

pub(super) fn open_trade_price(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let trades = non_empty(ind.trades(period)?, period)?;
    Ok(vec![trades[0].price])
}

pub(super) fn close_trade_price(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let trades = non_empty(ind.trades(period)?, period)?;
    Ok(vec![trades[trades.len() - 1].price])
}

/// Volume-weighted mean price.
pub(super) fn weighted_avg_price(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let trades = non_empty(ind.trades(period)?, period)?;
    let prices: Vec<f64> = trades.iter().map(|t| t.price).collect();
    let volumes: Vec<f64> = trades.iter().map(|t| t.volume).collect();
    let (mean, _) = weighted_avg_and_std(&prices, &volumes)
        .ok_or_else(|| HorseError::insufficient(format!("zero volume in {period}")))?;
    Ok(vec![mean])
}

/// `(offset, gradient)`: the period's first price, and the change in weighted
/// mean price from the previous period per second.
pub(super) fn weighted_average_trend(
    ind: &Indicator,
    period: &Period,
) -> Result<Vec<f64>, HorseError> {
    let mean0 = ind.child_value(IndicatorKind::WeightedAvgPrice, period)?;
    let mean1 = ind.child_value(IndicatorKind::WeightedAvgPrice, &period.offset(-1)?)?;
    let gradient = (mean0 - mean1) / period.period_sec() as f64;
    let trades = non_empty(ind.trades(period)?, period)?;
    Ok(vec![trades[0].price, gradient])
}

/// `(gradient, offset, stdev)` of a least-squares line through the period's
/// prices, where stdev is of the residuals.
pub(super) fn lin_price_trend(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let trades = non_empty(ind.trades(period)?, period)?;
    let points: Vec<(f64, f64)> = trades.iter().map(|t| (t.ts_exec, t.price)).collect();
    let (gradient, offset) = linear_regression(&points)
        .ok_or_else(|| HorseError::insufficient(format!("no trades in {period}")))?;
    let init_ts = points[0].0;
    let residuals: Vec<f64> = points
        .iter()
        .map(|(ts, price)| price - (ts - init_ts) * gradient - offset)
        .collect();
    let stdev = std_dev(&residuals).unwrap_or(0.0);
    Ok(vec![gradient, offset, stdev])
}

/// `(offset, gradient)`: the period's first price and the exponentially
/// smoothed gradient of the last N linear trends, most recent weighted most.
pub(super) fn smoothed_lin_price_gradient(
    ind: &Indicator,
    period: &Period,
    blocks: SmoothingBlocks,
) -> Result<Vec<f64>, HorseError> {
    let mut gradients = Vec::with_capacity(blocks.count() as usize);
    for n in 0..blocks.count() {
        let block = period.offset(-n)?;
        gradients.push(ind.child_value(IndicatorKind::LinPriceTrend, &block)?);
    }
    let trades = non_empty(ind.trades(period)?, period)?;
    let smoothed = exponential_smooth(&gradients, SMOOTHING_ALPHA)
        .ok_or_else(|| HorseError::insufficient("no gradient blocks"))?;
    Ok(vec![trades[0].price, smoothed])
}

#[cfg(test)]
mod tests {
    use crate::domain::clock::Clock;
    use crate::domain::error::HorseError;
    use crate::domain::indicator::{IndicatorFactory, IndicatorKind, SmoothingBlocks};
    use crate::domain::period::{FixedPeriod, Period, PeriodKind};
    use crate::domain::storage::memory;
    use crate::domain::trade::Trade;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    const T0: f64 = 1_425_211_200.0;

    /// One trade a minute for six hours, price rising 1.0 per minute from 200.
    fn factory() -> IndicatorFactory {
        let engine = memory::engine(Arc::new(Clock::fixed(T0 + 6.0 * 3600.0)));
        let trades: Vec<Trade> = (0..360)
            .map(|i| {
                let ts = T0 + i as f64 * 60.0;
                let volume = if i % 2 == 0 { 1.0 } else { 3.0 };
                Trade::new(1, i, 200.0 + i as f64, volume, ts, ts).unwrap()
            })
            .collect();
        engine.store_trades(&trades).unwrap();
        IndicatorFactory::new(engine, 16)
    }

    fn hour(offset: i64) -> Period {
        Period::from(FixedPeriod::around(PeriodKind::Hour1, T0).unwrap() + offset)
    }

    #[test]
    fn min_max() {
        let f = factory();
        let min = f.create(IndicatorKind::MinTradePrice, 1);
        let max = f.create(IndicatorKind::MaxTradePrice, 1);
        assert_eq!(min.hist(&hour(1)).unwrap(), vec![260.0]);
        assert_eq!(max.hist(&hour(1)).unwrap(), vec![319.0]);
    }

    #[test]
    fn empty_window_is_insufficient_data() {
        let f = factory();
        let min = f.create(IndicatorKind::MinTradePrice, 1);
        let err = min.hist(&hour(-1)).unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn weighted_average() {
        let f = factory();
        let wavg = f.create(IndicatorKind::WeightedAvgPrice, 1);
        // volume alternates 1, 3 so each pair averages 0.75 above its first price
        let v = wavg.hist(&hour(0)).unwrap();
        assert_relative_eq!(v[0], 229.75, epsilon = 1e-9);
    }

    #[test]
    fn weighted_average_trend_uses_previous_period() {
        let f = factory();
        let trend = f.create(IndicatorKind::WeightedAverageTrend, 1);
        let v = trend.hist(&hour(1)).unwrap();
        assert_eq!(v[0], 260.0);
        assert_relative_eq!(v[1], 60.0 / 3600.0, epsilon = 1e-9);
        assert!(trend.hist(&hour(0)).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn linear_trend_of_straight_line() {
        let f = factory();
        let lin = f.create(IndicatorKind::LinPriceTrend, 1);
        let v = lin.hist(&hour(2)).unwrap();
        assert_relative_eq!(v[0], 1.0 / 60.0, epsilon = 1e-9);
        assert_relative_eq!(v[1], 320.0, epsilon = 1e-6);
        assert!(v[2] < 1e-6);
    }

    #[test]
    fn smoothed_gradient_needs_full_history() {
        let f = factory();
        let smoothed = f.create(IndicatorKind::SmoothedLinPriceGradient(SmoothingBlocks::Six), 1);
        let v = smoothed.hist(&hour(5)).unwrap();
        assert_eq!(v[0], 500.0);
        assert_relative_eq!(v[1], 1.0 / 60.0, epsilon = 1e-9);
        assert!(smoothed.hist(&hour(4)).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn future_window_is_temporal() {
        let f = factory();
        let min = f.create(IndicatorKind::MinTradePrice, 1);
        assert!(matches!(min.hist(&hour(6)), Err(HorseError::Temporal { .. })));
    }
}
