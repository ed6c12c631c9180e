//! Historical market-data feed port.

use crate::domain::error::HorseError;
use crate::domain::trade::Trade;

pub trait TradeFeedPort {
    /// Load every trade the feed holds, tagged with `exchange_id`, in the
    /// order the feed supplies them.
    fn load_trades(&self, exchange_id: u32) -> Result<Vec<Trade>, HorseError>;
}
