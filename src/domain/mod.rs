//! Core domain types and logic: time, trades, indicators and the
//! self-tuning prediction ensemble.

pub mod axis;
pub mod boss;
pub mod clock;
pub mod coefficient;
pub mod config;
pub mod container;
pub mod datasource;
pub mod error;
pub mod indicator;
pub mod indicator_helpers;
pub mod period;
pub mod predictor;
pub mod replay;
pub mod snapshot;
pub mod storage;
pub mod trade;
