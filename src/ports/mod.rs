//! Port traits: the collaborators the ensemble core depends on.

pub mod config_port;
pub mod feed_port;
pub mod indicator_store_port;
pub mod snapshot_port;
pub mod trade_store_port;
