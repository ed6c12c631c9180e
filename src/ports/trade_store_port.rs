//! Persistent trade storage port.
//!
//! Implementations are plain stores: they know nothing about the shared clock.
//! The look-ahead guard lives in [`crate::domain::storage::StorageEngine`].

use crate::domain::error::HorseError;
use crate::domain::trade::Trade;

pub trait TradeStorePort: Send + Sync {
    /// Persist a trade. Trades executed before the newest stored one for the
    /// same exchange are dropped; returns whether the trade was kept.
    fn store(&self, trade: &Trade) -> Result<bool, HorseError>;

    /// Persist a batch, returning how many were kept.
    fn store_many(&self, trades: &[Trade]) -> Result<usize, HorseError> {
        let mut kept = 0;
        for trade in trades {
            if self.store(trade)? {
                kept += 1;
            }
        }
        Ok(kept)
    }

    /// Trades with `lhs_ts <= ts_exec < rhs_ts`, ordered by execution time.
    fn fetch(&self, exchange_id: u32, lhs_ts: f64, rhs_ts: f64) -> Result<Vec<Trade>, HorseError>;

    /// The most recent trade executed at or before `before_ts`.
    fn fetch_one(&self, exchange_id: u32, before_ts: f64) -> Result<Option<Trade>, HorseError>;

    fn latest_ts_exec(&self, exchange_id: u32) -> Result<Option<f64>, HorseError>;

    fn count(&self, exchange_id: u32) -> Result<usize, HorseError>;

    /// Earliest and latest execution times held for an exchange.
    fn time_range(&self, exchange_id: u32) -> Result<Option<(f64, f64)>, HorseError>;
}
