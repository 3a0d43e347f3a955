// Library crate - exports the indicator engine, feeds and shared types

pub mod types;
pub mod config;
pub mod indicators;
pub mod feed;

// Re-export commonly used types
pub use types::*;
pub use config::FeedConfig;
pub use indicators::{IndicatorEngine, IndicatorSnapshot, IngestOutcome, RelativeValues};
