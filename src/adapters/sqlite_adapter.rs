//! SQLite storage for trades and indicator values.

use crate::domain::error::HorseError;
use crate::domain::period::FixedPeriod;
use crate::domain::trade::Trade;
use crate::ports::config_port::ConfigPort;
use crate::ports::indicator_store_port::IndicatorStorePort;
use crate::ports::trade_store_port::TradeStorePort;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> HorseError {
    HorseError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> HorseError {
    HorseError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, HorseError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| HorseError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4);
        if pool_size < 1 {
            return Err(HorseError::ConfigInvalid {
                section: "sqlite".into(),
                key: "pool_size".into(),
                reason: "pool_size must be at least 1".into(),
            });
        }

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size as u32)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    /// A private database that lives as long as the adapter. The pool holds a
    /// single connection so every caller sees the same data.
    pub fn in_memory() -> Result<Self, HorseError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), HorseError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS hist_trades (
                exchange_id INTEGER NOT NULL,
                trade_id INTEGER NOT NULL,
                ts_exec REAL NOT NULL,
                ts_update REAL NOT NULL,
                price REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (exchange_id, trade_id)
            );
            CREATE INDEX IF NOT EXISTS idx_hist_trades_exec ON hist_trades(exchange_id, ts_exec);
            CREATE TABLE IF NOT EXISTS hist_indicator_values (
                exchange_id INTEGER NOT NULL,
                indicator_id INTEGER NOT NULL,
                start_ts INTEGER NOT NULL,
                period INTEGER NOT NULL,
                field_num INTEGER NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (exchange_id, indicator_id, start_ts, period, field_num)
            );",
        )
        .map_err(query_error)?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, HorseError> {
        self.pool.get().map_err(pool_error)
    }
}

fn latest_ts(conn: &rusqlite::Connection, exchange_id: u32) -> Result<Option<f64>, HorseError> {
    conn.query_row(
        "SELECT MAX(ts_exec) FROM hist_trades WHERE exchange_id = ?1",
        params![exchange_id],
        |row| row.get(0),
    )
    .map_err(query_error)
}

fn insert_trade(conn: &rusqlite::Connection, trade: &Trade) -> Result<bool, HorseError> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO hist_trades (exchange_id, trade_id, ts_exec, ts_update, price, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                trade.exchange_id,
                trade.trade_id,
                trade.ts_exec,
                trade.ts_update,
                trade.price,
                trade.volume
            ],
        )
        .map_err(query_error)?;
    Ok(inserted == 1)
}

fn trade_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trade> {
    Ok(Trade {
        exchange_id: row.get(0)?,
        trade_id: row.get(1)?,
        ts_exec: row.get(2)?,
        ts_update: row.get(3)?,
        price: row.get(4)?,
        volume: row.get(5)?,
    })
}

impl TradeStorePort for SqliteAdapter {
    fn store(&self, trade: &Trade) -> Result<bool, HorseError> {
        let conn = self.conn()?;
        if latest_ts(&conn, trade.exchange_id)?.is_some_and(|last| trade.ts_exec < last) {
            return Ok(false);
        }
        insert_trade(&conn, trade)
    }

    fn store_many(&self, trades: &[Trade]) -> Result<usize, HorseError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let mut kept = 0;
        for trade in trades {
            if latest_ts(&tx, trade.exchange_id)?.is_some_and(|last| trade.ts_exec < last) {
                continue;
            }
            if insert_trade(&tx, trade)? {
                kept += 1;
            }
        }
        tx.commit().map_err(query_error)?;
        Ok(kept)
    }

    fn fetch(&self, exchange_id: u32, lhs_ts: f64, rhs_ts: f64) -> Result<Vec<Trade>, HorseError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT exchange_id, trade_id, ts_exec, ts_update, price, volume
                 FROM hist_trades
                 WHERE exchange_id = ?1 AND ts_exec >= ?2 AND ts_exec < ?3
                 ORDER BY ts_exec ASC, ts_update ASC, trade_id ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![exchange_id, lhs_ts, rhs_ts], trade_from_row)
            .map_err(query_error)?;

        let mut trades = Vec::new();
        for row in rows {
            trades.push(row.map_err(query_error)?);
        }
        Ok(trades)
    }

    fn fetch_one(&self, exchange_id: u32, before_ts: f64) -> Result<Option<Trade>, HorseError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT exchange_id, trade_id, ts_exec, ts_update, price, volume
             FROM hist_trades
             WHERE exchange_id = ?1 AND ts_exec <= ?2
             ORDER BY ts_exec DESC, ts_update DESC, trade_id DESC
             LIMIT 1",
            params![exchange_id, before_ts],
            trade_from_row,
        )
        .optional()
        .map_err(query_error)
    }

    fn latest_ts_exec(&self, exchange_id: u32) -> Result<Option<f64>, HorseError> {
        latest_ts(&*self.conn()?, exchange_id)
    }

    fn count(&self, exchange_id: u32) -> Result<usize, HorseError> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM hist_trades WHERE exchange_id = ?1",
                params![exchange_id],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        Ok(count as usize)
    }

    fn time_range(&self, exchange_id: u32) -> Result<Option<(f64, f64)>, HorseError> {
        let range: (Option<f64>, Option<f64>) = self
            .conn()?
            .query_row(
                "SELECT MIN(ts_exec), MAX(ts_exec) FROM hist_trades WHERE exchange_id = ?1",
                params![exchange_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(query_error)?;
        Ok(match range {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            _ => None,
        })
    }
}

impl IndicatorStorePort for SqliteAdapter {
    fn store_values(
        &self,
        exchange_id: u32,
        indicator_id: u32,
        period: &FixedPeriod,
        values: &[f64],
    ) -> Result<(), HorseError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        tx.execute(
            "DELETE FROM hist_indicator_values
             WHERE exchange_id = ?1 AND indicator_id = ?2 AND start_ts = ?3 AND period = ?4",
            params![exchange_id, indicator_id, period.lhs_ts(), period.period_sec()],
        )
        .map_err(query_error)?;
        for (field_num, value) in values.iter().enumerate() {
            tx.execute(
                "INSERT INTO hist_indicator_values (exchange_id, indicator_id, start_ts, period, field_num, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    exchange_id,
                    indicator_id,
                    period.lhs_ts(),
                    period.period_sec(),
                    field_num as i64,
                    value
                ],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(())
    }

    fn load_values(
        &self,
        exchange_id: u32,
        indicator_id: u32,
        period: &FixedPeriod,
    ) -> Result<Option<Vec<f64>>, HorseError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT value FROM hist_indicator_values
                 WHERE exchange_id = ?1 AND indicator_id = ?2 AND start_ts = ?3 AND period = ?4
                 ORDER BY field_num ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(
                params![exchange_id, indicator_id, period.lhs_ts(), period.period_sec()],
                |row| row.get::<_, f64>(0),
            )
            .map_err(query_error)?;

        let mut values = Vec::new();
        for row in rows {
            values.push(row.map_err(query_error)?);
        }
        Ok(if values.is_empty() { None } else { Some(values) })
    }
}
