//! bitcoincharts-style trade dumps: `unix_ts,price,volume`, no header.
//!
//! The dumps carry no trade ids and only whole-second timestamps, so ids are
//! synthesised in file order and `ts_update` equals `ts_exec`. Trades sharing
//! a second are ordered by those ids downstream.

use crate::domain::config::FeedConfig;
use crate::domain::error::HorseError;
use crate::domain::trade::Trade;
use crate::ports::feed_port::TradeFeedPort;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CsvTradeFeed {
    path: PathBuf,
    start_ts: Option<f64>,
    stop_ts: Option<f64>,
    limit: Option<usize>,
}

impl CsvTradeFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            start_ts: None,
            stop_ts: None,
            limit: None,
        }
    }

    pub fn from_feed_config(feed: &FeedConfig) -> Result<Self, HorseError> {
        Ok(Self::new(feed.require_path()?).with_window(feed.start_ts, feed.stop_ts))
    }

    /// Keep only trades with `start <= ts_exec <= stop`.
    pub fn with_window(mut self, start_ts: Option<f64>, stop_ts: Option<f64>) -> Self {
        self.start_ts = start_ts;
        self.stop_ts = stop_ts;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse trades from any reader, applying the window and limit.
    pub fn read_trades<R: Read>(&self, reader: R, exchange_id: u32) -> Result<Vec<Trade>, HorseError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut trades = Vec::new();
        let mut skipped = 0usize;

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| HorseError::Feed {
                reason: format!("{}: CSV parse error: {e}", self.path.display()),
            })?;
            let field = |i: usize, name: &str| {
                record.get(i).ok_or_else(|| HorseError::Feed {
                    reason: format!("{} line {}: missing {name} column", self.path.display(), line + 1),
                })
            };

            let ts_exec: i64 = field(0, "timestamp")?.parse().map_err(|e| HorseError::Feed {
                reason: format!("{} line {}: invalid timestamp: {e}", self.path.display(), line + 1),
            })?;
            if self.start_ts.is_some_and(|start| (ts_exec as f64) < start) {
                continue;
            }
            if self.stop_ts.is_some_and(|stop| ts_exec as f64 > stop) {
                break;
            }

            let price = truncated(field(1, "price")?, 2).map_err(|reason| HorseError::Feed {
                reason: format!("{} line {}: price {reason}", self.path.display(), line + 1),
            })?;
            let volume = truncated(field(2, "volume")?, 8).map_err(|reason| HorseError::Feed {
                reason: format!("{} line {}: volume {reason}", self.path.display(), line + 1),
            })?;

            let trade_id = (trades.len() + skipped + 1) as i64;
            let ts = ts_exec as f64;
            match Trade::new(exchange_id, trade_id, price, volume, ts, ts) {
                Ok(trade) => trades.push(trade),
                Err(e) => {
                    // the dumps contain the odd negative volume
                    tracing::debug!(line = line + 1, error = %e, "skipping unusable trade");
                    skipped += 1;
                    continue;
                }
            }
            if self.limit.is_some_and(|limit| trades.len() >= limit) {
                break;
            }
        }

        if skipped > 0 {
            tracing::warn!(path = %self.path.display(), skipped, "unusable trades skipped");
        }
        Ok(trades)
    }
}

impl TradeFeedPort for CsvTradeFeed {
    fn load_trades(&self, exchange_id: u32) -> Result<Vec<Trade>, HorseError> {
        let file = File::open(&self.path).map_err(|e| HorseError::Feed {
            reason: format!("failed to read {}: {e}", self.path.display()),
        })?;
        let trades = self.read_trades(file, exchange_id)?;
        tracing::info!(path = %self.path.display(), trades = trades.len(), "trade feed loaded");
        Ok(trades)
    }
}

/// Parse a decimal, discarding digits past `places` without rounding.
fn truncated(raw: &str, places: usize) -> Result<f64, String> {
    let cut = match raw.split_once('.') {
        Some((whole, frac)) if frac.len() > places => format!("{whole}.{}", &frac[..places]),
        _ => raw.to_string(),
    };
    cut.parse::<f64>()
        .map_err(|e| format!("'{raw}' is not a number: {e}"))
}
