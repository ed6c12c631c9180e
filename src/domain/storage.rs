//! Clock-aware facade over the trade and indicator stores.
//!
//! Every read is checked against the shared clock so that no component can see
//! trades from the future during a backtest.

use crate::domain::clock::{printable_ts, Clock};
use crate::domain::datasource::Datasource;
use crate::domain::error::HorseError;
use crate::domain::period::{FixedPeriod, Period};
use crate::domain::trade::Trade;
use crate::ports::indicator_store_port::IndicatorStorePort;
use crate::ports::trade_store_port::TradeStorePort;
use std::sync::Arc;

/// Subscription priority used when persisting published trades. Lower than
/// any consumer so that stored history includes the trade being dispatched.
pub const STORE_PRIORITY: i32 = 10;

#[derive(Clone)]
pub struct StorageEngine {
    trades: Arc<dyn TradeStorePort>,
    indicators: Arc<dyn IndicatorStorePort>,
    clock: Arc<Clock>,
}

impl StorageEngine {
    pub fn new(
        trades: Arc<dyn TradeStorePort>,
        indicators: Arc<dyn IndicatorStorePort>,
        clock: Arc<Clock>,
    ) -> Self {
        Self {
            trades,
            indicators,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    pub fn store_trade(&self, trade: &Trade) -> Result<bool, HorseError> {
        self.trades.store(trade)
    }

    pub fn store_trades(&self, trades: &[Trade]) -> Result<usize, HorseError> {
        self.trades.store_many(trades)
    }

    /// Trades executed inside `period`. Fails with `Temporal` if the period
    /// ends after now.
    pub fn fetch(&self, exchange_id: u32, period: &Period) -> Result<Vec<Trade>, HorseError> {
        let rhs = period.rhs_ts();
        let now = self.clock.time();
        if rhs > now {
            return Err(HorseError::temporal(format!(
                "cannot fetch {period}: it ends at {} but it is only {}",
                printable_ts(rhs),
                printable_ts(now)
            )));
        }
        self.trades.fetch(exchange_id, period.lhs_ts(), rhs)
    }

    /// The newest trade executed at or before `before_ts`.
    pub fn fetch_one(&self, exchange_id: u32, before_ts: f64) -> Result<Trade, HorseError> {
        let now = self.clock.time();
        if before_ts > now {
            return Err(HorseError::temporal(format!(
                "cannot fetch trade before {}: it is only {}",
                printable_ts(before_ts),
                printable_ts(now)
            )));
        }
        self.trades
            .fetch_one(exchange_id, before_ts)?
            .ok_or_else(|| {
                HorseError::insufficient(format!(
                    "no trade at or before {}",
                    printable_ts(before_ts)
                ))
            })
    }

    pub fn latest_ts_exec(&self, exchange_id: u32) -> Result<Option<f64>, HorseError> {
        self.trades.latest_ts_exec(exchange_id)
    }

    pub fn trade_count(&self, exchange_id: u32) -> Result<usize, HorseError> {
        self.trades.count(exchange_id)
    }

    pub fn trade_time_range(&self, exchange_id: u32) -> Result<Option<(f64, f64)>, HorseError> {
        self.trades.time_range(exchange_id)
    }

    pub fn store_indicator(
        &self,
        exchange_id: u32,
        indicator_id: u32,
        period: &FixedPeriod,
        values: &[f64],
    ) -> Result<(), HorseError> {
        self.indicators
            .store_values(exchange_id, indicator_id, period, values)
    }

    pub fn load_indicator(
        &self,
        exchange_id: u32,
        indicator_id: u32,
        period: &FixedPeriod,
    ) -> Result<Option<Vec<f64>>, HorseError> {
        self.indicators.load_values(exchange_id, indicator_id, period)
    }

    /// Persist every trade published on `datasource`.
    pub fn subscribe_to(&self, datasource: &Datasource) {
        let engine = self.clone();
        datasource.subscribe(
            STORE_PRIORITY,
            Box::new(move |trade: &Trade| {
                if let Err(e) = engine.store_trade(trade) {
                    tracing::warn!(error = %e, trade_id = trade.trade_id, "failed to store trade");
                }
            }),
        );
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// In-memory stores, used by tests and by runs without a database.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct MemoryTradeStore {
        trades: Mutex<HashMap<u32, Vec<Trade>>>,
    }

    impl MemoryTradeStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, Vec<Trade>>> {
            self.trades
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    impl TradeStorePort for MemoryTradeStore {
        fn store(&self, trade: &Trade) -> Result<bool, HorseError> {
            let mut all = self.lock();
            let list = all.entry(trade.exchange_id).or_default();
            if list.last().is_some_and(|last| trade.ts_exec < last.ts_exec) {
                return Ok(false);
            }
            let at = list.partition_point(|t| t.chronological(trade).is_le());
            list.insert(at, trade.clone());
            Ok(true)
        }

        fn fetch(&self, exchange_id: u32, lhs_ts: f64, rhs_ts: f64) -> Result<Vec<Trade>, HorseError> {
            Ok(self
                .lock()
                .get(&exchange_id)
                .map(|list| {
                    list.iter()
                        .filter(|t| lhs_ts <= t.ts_exec && t.ts_exec < rhs_ts)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        fn fetch_one(&self, exchange_id: u32, before_ts: f64) -> Result<Option<Trade>, HorseError> {
            Ok(self.lock().get(&exchange_id).and_then(|list| {
                list.iter()
                    .rev()
                    .find(|t| t.ts_exec <= before_ts)
                    .cloned()
            }))
        }

        fn latest_ts_exec(&self, exchange_id: u32) -> Result<Option<f64>, HorseError> {
            Ok(self
                .lock()
                .get(&exchange_id)
                .and_then(|list| list.last().map(|t| t.ts_exec)))
        }

        fn count(&self, exchange_id: u32) -> Result<usize, HorseError> {
            Ok(self.lock().get(&exchange_id).map_or(0, Vec::len))
        }

        fn time_range(&self, exchange_id: u32) -> Result<Option<(f64, f64)>, HorseError> {
            Ok(self.lock().get(&exchange_id).and_then(|list| {
                match (list.first(), list.last()) {
                    (Some(a), Some(b)) => Some((a.ts_exec, b.ts_exec)),
                    _ => None,
                }
            }))
        }
    }

    type IndicatorKey = (u32, u32, i64, i64);

    #[derive(Debug, Default)]
    pub struct MemoryIndicatorStore {
        values: Mutex<HashMap<IndicatorKey, Vec<f64>>>,
    }

    impl MemoryIndicatorStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.lock().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<IndicatorKey, Vec<f64>>> {
            self.values
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    impl IndicatorStorePort for MemoryIndicatorStore {
        fn store_values(
            &self,
            exchange_id: u32,
            indicator_id: u32,
            period: &FixedPeriod,
            values: &[f64],
        ) -> Result<(), HorseError> {
            let key = (exchange_id, indicator_id, period.lhs_ts(), period.period_sec());
            self.lock().insert(key, values.to_vec());
            Ok(())
        }

        fn load_values(
            &self,
            exchange_id: u32,
            indicator_id: u32,
            period: &FixedPeriod,
        ) -> Result<Option<Vec<f64>>, HorseError> {
            let key = (exchange_id, indicator_id, period.lhs_ts(), period.period_sec());
            Ok(self.lock().get(&key).cloned())
        }
    }

    /// A storage engine backed entirely by memory.
    pub fn engine(clock: Arc<Clock>) -> StorageEngine {
        StorageEngine::new(
            Arc::new(MemoryTradeStore::new()),
            Arc::new(MemoryIndicatorStore::new()),
            clock,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::period::{FloatingPeriod, PeriodKind};

    const T0: f64 = 1_425_211_200.0;

    fn trade(id: i64, ts: f64, price: f64) -> Trade {
        Trade::new(1, id, price, 1.0, ts, ts).unwrap()
    }

    fn populated(now: f64) -> StorageEngine {
        let engine = memory::engine(Arc::new(Clock::fixed(now)));
        let trades: Vec<Trade> = (0..10).map(|i| trade(i, T0 + i as f64 * 60.0, 100.0 + i as f64)).collect();
        engine.store_trades(&trades).unwrap();
        engine
    }

    #[test]
    fn stale_trades_are_dropped() {
        let engine = memory::engine(Arc::new(Clock::fixed(T0)));
        assert!(engine.store_trade(&trade(1, T0, 100.0)).unwrap());
        assert!(!engine.store_trade(&trade(2, T0 - 1.0, 100.0)).unwrap());
        assert!(engine.store_trade(&trade(3, T0, 101.0)).unwrap());
        assert_eq!(engine.trade_count(1).unwrap(), 2);
    }

    #[test]
    fn same_second_trades_keep_id_order() {
        let store = memory::MemoryTradeStore::new();
        store.store(&trade(7, T0, 100.0)).unwrap();
        store.store(&trade(3, T0, 101.0)).unwrap();
        store.store(&trade(5, T0, 102.0)).unwrap();

        let ids: Vec<i64> = store.fetch(1, T0, T0 + 1.0).unwrap().iter().map(|t| t.trade_id).collect();
        assert_eq!(ids, vec![3, 5, 7]);
        assert_eq!(store.fetch_one(1, T0).unwrap().map(|t| t.trade_id), Some(7));
    }

    #[test]
    fn fetch_respects_half_open_window() {
        let engine = populated(T0 + 7200.0);
        let period = Period::from(FixedPeriod::around(PeriodKind::Min5, T0).unwrap());
        let trades = engine.fetch(1, &period).unwrap();
        assert_eq!(trades.len(), 5);
        assert_eq!(trades[0].trade_id, 0);
        assert_eq!(trades[4].trade_id, 4);
    }

    #[test]
    fn fetch_into_future_is_temporal() {
        let engine = populated(T0 + 100.0);
        let period = Period::from(FixedPeriod::around(PeriodKind::Min5, T0).unwrap());
        assert!(matches!(engine.fetch(1, &period), Err(HorseError::Temporal { .. })));
        assert!(matches!(engine.fetch_one(1, T0 + 101.0), Err(HorseError::Temporal { .. })));
    }

    #[test]
    fn fetch_floating_period() {
        let clock = Arc::new(Clock::fixed(T0 + 600.0));
        let engine = memory::engine(clock.clone());
        let trades: Vec<Trade> = (0..10).map(|i| trade(i, T0 + i as f64 * 60.0, 100.0)).collect();
        engine.store_trades(&trades).unwrap();
        let floating = FloatingPeriod::new(PeriodKind::Min5, 0.0, clock).unwrap();
        let got = engine.fetch(1, &Period::from(floating)).unwrap();
        assert_eq!(got.iter().map(|t| t.trade_id).collect::<Vec<_>>(), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn fetch_one_finds_latest_before() {
        let engine = populated(T0 + 7200.0);
        assert_eq!(engine.fetch_one(1, T0 + 150.0).unwrap().trade_id, 2);
        assert_eq!(engine.fetch_one(1, T0 + 120.0).unwrap().trade_id, 2);
        assert!(engine.fetch_one(1, T0 - 1.0).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn subscribes_to_datasource() {
        let engine = memory::engine(Arc::new(Clock::fixed(T0)));
        let ds = Datasource::new(1, "test");
        engine.subscribe_to(&ds);
        ds.publish(&trade(1, T0, 100.0));
        assert_eq!(engine.latest_ts_exec(1).unwrap(), Some(T0));
    }

    #[test]
    fn indicator_values_roundtrip_by_key() {
        let engine = memory::engine(Arc::new(Clock::fixed(T0)));
        let p = FixedPeriod::around(PeriodKind::Hour1, T0).unwrap();
        engine.store_indicator(1, 41, &p, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(engine.load_indicator(1, 41, &p).unwrap(), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(engine.load_indicator(1, 41, &(p + 1)).unwrap(), None);
        assert_eq!(engine.load_indicator(2, 41, &p).unwrap(), None);
    }
}
