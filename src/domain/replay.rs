//! Deterministic replay of historical trades.
//!
//! The event loop is single threaded: the clock is moved to each trade's
//! execution time, timers that fall due on the way fire first, then the trade
//! is published to every subscriber of the datasource.

use crate::domain::clock::{printable_ts, Clock};
use crate::domain::datasource::Datasource;
use crate::domain::trade::Trade;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    pub published: usize,
    /// Trades dropped for running backwards in time.
    pub skipped: usize,
    pub first_ts: Option<f64>,
    pub last_ts: Option<f64>,
    pub last_price: Option<f64>,
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.first_ts, self.last_ts) {
            (Some(first), Some(last)) => write!(
                f,
                "{} trades from {} to {} ({} skipped)",
                self.published,
                printable_ts(first),
                printable_ts(last),
                self.skipped
            ),
            _ => write!(f, "no trades replayed ({} skipped)", self.skipped),
        }
    }
}

pub fn replay<I>(trades: I, datasource: &Datasource, clock: &Clock) -> ReplaySummary
where
    I: IntoIterator<Item = Trade>,
{
    let mut summary = ReplaySummary::default();
    for trade in trades {
        if trade.exchange_id != datasource.exchange_id() {
            summary.skipped += 1;
            continue;
        }
        if summary.last_ts.is_some_and(|last| trade.ts_exec < last) {
            tracing::warn!(trade_id = trade.trade_id, ts = trade.ts_exec, "out of order trade skipped");
            summary.skipped += 1;
            continue;
        }
        clock.override_time(Some(trade.ts_exec));
        datasource.publish(&trade);

        summary.published += 1;
        summary.first_ts.get_or_insert(trade.ts_exec);
        summary.last_ts = Some(trade.ts_exec);
        summary.last_price = Some(trade.price);
        if summary.published % 100_000 == 0 {
            tracing::debug!(published = summary.published, at = %clock.printable(), "replay progress");
        }
    }
    tracing::info!(summary = %summary, "replay finished");
    summary
}
