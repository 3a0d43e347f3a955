//! Indicator Engine
//!
//! Streaming EMA(9/12/26), VWAP and MACD over two bar timeframes:
//! - Bounded per-timeframe bar history
//! - Dedup of stale bars and deferred recalculation during backfill
//! - Heuristic per-timeframe signal and a weighted cross-timeframe signal

pub mod bar;
pub mod history;
pub mod math;
pub mod state;
pub mod engine;

pub use bar::{Bar, BarParseError, RawBar, parse_bar_time};
pub use history::{BarHistory, DEFAULT_HISTORY_CAPACITY};
pub use math::{MacdOutput, combine_signals, ema, extrapolate_signal, macd, vwap};
pub use state::{EmaState, IndicatorSnapshot, IngestOutcome, TimeframeState};
pub use engine::{IndicatorEngine, RelativeValues};
