//! Wilder's directional movement family, evaluated per UTC day.

use super::{Indicator, IndicatorKind};
use crate::domain::error::HorseError;
use crate::domain::indicator_helpers::exponential_smooth;
use crate::domain::period::Period;

const LOOKBACK_DAYS: i64 = 14;
const SMOOTHING_ALPHA: f64 = 0.5;

/// Today's high minus yesterday's high.
fn up_move(ind: &Indicator, period: &Period) -> Result<f64, HorseError> {
    let today = ind.child_value(IndicatorKind::MaxTradePrice, period)?;
    let yesterday = ind.child_value(IndicatorKind::MaxTradePrice, &period.offset(-1)?)?;
    Ok(today - yesterday)
}

/// Yesterday's low minus today's low.
fn down_move(ind: &Indicator, period: &Period) -> Result<f64, HorseError> {
    let today = ind.child_value(IndicatorKind::MinTradePrice, period)?;
    let yesterday = ind.child_value(IndicatorKind::MinTradePrice, &period.offset(-1)?)?;
    Ok(yesterday - today)
}

pub(super) fn pos_dm(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let up = up_move(ind, period)?;
    let down = down_move(ind, period)?;
    Ok(vec![if up > down && up > 0.0 { up } else { 0.0 }])
}

pub(super) fn neg_dm(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let up = up_move(ind, period)?;
    let down = down_move(ind, period)?;
    Ok(vec![if down > up && down > 0.0 { down } else { 0.0 }])
}

/// Day range, extended to yesterday's close when that lies outside it.
pub(super) fn true_range(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let high = ind.child_value(IndicatorKind::MaxTradePrice, period)?;
    let low = ind.child_value(IndicatorKind::MinTradePrice, period)?;
    let close = ind.child_value(IndicatorKind::CloseTradePrice1Day, &period.offset(-1)?)?;
    let range = (high - low)
        .max((high - close).abs())
        .max((low - close).abs());
    Ok(vec![range])
}

fn lookback(ind: &Indicator, kind: IndicatorKind, period: &Period) -> Result<Vec<f64>, HorseError> {
    (0..LOOKBACK_DAYS)
        .map(|n| ind.child_value(kind, &period.offset(-n)?))
        .collect()
}

fn directional_index(
    ind: &Indicator,
    period: &Period,
    dm: IndicatorKind,
) -> Result<Vec<f64>, HorseError> {
    let dm_smoothed = smooth(&lookback(ind, dm, period)?)?;
    let tr_smoothed = smooth(&lookback(ind, IndicatorKind::TrueRange1Day, period)?)?;
    if tr_smoothed == 0.0 {
        return Err(HorseError::insufficient(format!(
            "flat true range over 14 days to {period}"
        )));
    }
    Ok(vec![100.0 * dm_smoothed / tr_smoothed])
}

pub(super) fn pos_di(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    directional_index(ind, period, IndicatorKind::PosDm1Day)
}

pub(super) fn neg_di(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    directional_index(ind, period, IndicatorKind::NegDm1Day)
}

/// 100 times the smoothed `|+DI - -DI| / (+DI + -DI)`.
pub(super) fn adx(ind: &Indicator, period: &Period) -> Result<Vec<f64>, HorseError> {
    let pos = lookback(ind, IndicatorKind::PosDi1Day, period)?;
    let neg = lookback(ind, IndicatorKind::NegDi1Day, period)?;
    let ratios: Vec<f64> = pos
        .iter()
        .zip(&neg)
        .map(|(p, n)| if p + n == 0.0 { 0.0 } else { (p - n).abs() / (p + n) })
        .collect();
    Ok(vec![100.0 * smooth(&ratios)?])
}

fn smooth(values: &[f64]) -> Result<f64, HorseError> {
    exponential_smooth(values, SMOOTHING_ALPHA)
        .ok_or_else(|| HorseError::insufficient("nothing to smooth"))
}
