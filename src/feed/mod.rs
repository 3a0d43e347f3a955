//! Bar-data sources feeding the indicator engine
//!
//! - 5-second to 10s/30s bar aggregation
//! - Interactive Brokers historical + real-time bars
//! - CSV replay of TWS-formatted bars

pub mod aggregate;
pub mod ib;
pub mod replay;

pub use aggregate::BarAggregator;
pub use ib::{IbBarFeed, create_stock_contract};
pub use replay::{ReplaySummary, replay_csv, replay_file};
