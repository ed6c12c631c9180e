//! A single executed trade on an exchange.

use crate::domain::clock::printable_ts;
use crate::domain::error::HorseError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub exchange_id: u32,
    /// Exchange-assigned id, or a synthetic increasing id for replayed feeds.
    pub trade_id: i64,
    pub price: f64,
    pub volume: f64,
    /// When the exchange says the trade executed.
    pub ts_exec: f64,
    /// When the trade reached us.
    pub ts_update: f64,
}

impl Trade {
    pub fn new(
        exchange_id: u32,
        trade_id: i64,
        price: f64,
        volume: f64,
        ts_exec: f64,
        ts_update: f64,
    ) -> Result<Self, HorseError> {
        if price.is_nan() || price <= 0.0 {
            return Err(HorseError::InvalidArgument {
                reason: format!("trade {trade_id} has non-positive price {price}"),
            });
        }
        if volume.is_nan() || volume <= 0.0 {
            return Err(HorseError::InvalidArgument {
                reason: format!("trade {trade_id} has non-positive volume {volume}"),
            });
        }
        Ok(Self {
            exchange_id,
            trade_id,
            price,
            volume,
            ts_exec,
            ts_update,
        })
    }

    /// Store order: execution time, then arrival, then trade id. Trades in
    /// one second often share both timestamps, so the id settles ties.
    pub fn chronological(&self, other: &Trade) -> Ordering {
        self.ts_exec
            .total_cmp(&other.ts_exec)
            .then(self.ts_update.total_cmp(&other.ts_update))
            .then(self.trade_id.cmp(&other.trade_id))
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Trade {:.8} @ {:.2} @ {}>",
            self.volume,
            self.price,
            printable_ts(self.ts_exec)
        )
    }
}
