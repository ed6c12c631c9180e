//! Persistent indicator value storage port.
//!
//! Values are keyed by `(exchange_id, indicator_id, period.lhs_ts,
//! period.period_sec)`. Only fixed periods are storable.

use crate::domain::error::HorseError;
use crate::domain::period::FixedPeriod;

pub trait IndicatorStorePort: Send + Sync {
    /// Insert or replace the values for a key.
    fn store_values(
        &self,
        exchange_id: u32,
        indicator_id: u32,
        period: &FixedPeriod,
        values: &[f64],
    ) -> Result<(), HorseError>;

    /// `Ok(None)` when nothing is stored for the key.
    fn load_values(
        &self,
        exchange_id: u32,
        indicator_id: u32,
        period: &FixedPeriod,
    ) -> Result<Option<Vec<f64>>, HorseError>;
}
