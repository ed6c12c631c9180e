//! Forecasts must not depend on anything that happened after their horizon.
//!
//! Two stores share the same history up to a cut-off and diverge wildly after
//! it. Every model asked for a forecast with its horizon at or before the
//! cut-off must answer identically from both.

mod common;

use common::*;
use luckyhorse::domain::coefficient::{CoefValue, CoefficientSet};
use luckyhorse::domain::error::HorseError;
use luckyhorse::domain::period::{Anchor, PeriodKind, PeriodSpec};
use luckyhorse::domain::predictor::{model_by_name, Predictor, PredictorFactory};
use luckyhorse::domain::trade::Trade;
use proptest::prelude::*;
use std::collections::BTreeMap;

const DAY: f64 = 24.0 * HOUR;

/// Identical minute trades before `cut_ts`; after it `future` is added to every price.
fn market(cut_ts: f64, future: f64) -> PredictorFactory {
    let engine = engine_at(T0 + 3.0 * DAY);
    let trades: Vec<Trade> = price_walk(T0, 2 * 24 * 60, 60.0)
        .into_iter()
        .map(|t| {
            if t.ts_exec > cut_ts {
                trade(t.trade_id, t.ts_exec, t.price + future)
            } else {
                t
            }
        })
        .collect();
    engine.store_trades(&trades).unwrap();
    predictor_factory(engine)
}

fn bind(factory: &PredictorFactory, name: &str, values: &[(&str, CoefValue)]) -> Predictor {
    let set: BTreeMap<String, CoefValue> = values.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    factory
        .create(model_by_name(name).unwrap(), CoefficientSet::new(set))
        .unwrap()
}

fn predictors(factory: &PredictorFactory, period_sec: i64, delta: f64, spec: PeriodSpec) -> Vec<Predictor> {
    vec![
        bind(factory, "PatternTimePeriod", &[
            ("period_sec", CoefValue::Int(period_sec)),
            ("delta", CoefValue::Float(delta)),
        ]),
        bind(factory, "LinGradient", &[("period_type", CoefValue::Period(spec))]),
        bind(factory, "SmoothedLinGradient", &[("period_type", CoefValue::Period(spec))]),
        bind(factory, "WMeanGradient", &[("period_type", CoefValue::Period(spec))]),
    ]
}

fn period_spec() -> impl Strategy<Value = PeriodSpec> {
    prop::sample::select(vec![
        PeriodSpec::new(PeriodKind::Hour12, Anchor::HourLhs),
        PeriodSpec::new(PeriodKind::Hour6, Anchor::HourLhs),
        PeriodSpec::new(PeriodKind::Hour3, Anchor::HourLhs),
        PeriodSpec::new(PeriodKind::Hour1, Anchor::TenMinLhs),
        PeriodSpec::new(PeriodKind::Min30, Anchor::TenMinLhs),
        PeriodSpec::new(PeriodKind::Min15, Anchor::Calendar),
    ])
}

/// Bitwise, so that identical NaNs compare equal.
fn outcome(result: &Result<f64, HorseError>) -> Result<u64, String> {
    match result {
        Ok(v) => Ok(v.to_bits()),
        Err(e) => Err(e.to_string()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn forecasts_ignore_data_past_the_horizon(
        horizon_offset in 8.0 * HOUR..40.0 * HOUR,
        ahead in 0.0f64..12.0 * HOUR,
        period_sec in 1805i64..43_200,
        delta in -100.0f64..100.0,
        spec in period_spec(),
    ) {
        let horizon_ts = T0 + horizon_offset;
        let ts = horizon_ts + ahead;
        let calm = market(horizon_ts, 0.0);
        let wild = market(horizon_ts, 5_000.0);

        for (a, b) in predictors(&calm, period_sec, delta, spec)
            .iter()
            .zip(predictors(&wild, period_sec, delta, spec).iter())
        {
            let left = a.predict(ts, Some(horizon_ts));
            let right = b.predict(ts, Some(horizon_ts));
            prop_assert!(
                !matches!(left, Err(HorseError::Temporal { .. })),
                "{} reached past its horizon: {:?}", a.name(), left
            );
            prop_assert_eq!(outcome(&left), outcome(&right), "{} saw the future", a.name());
        }
    }
}
