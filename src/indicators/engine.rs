//! Indicator engine shared between the bar-data source and its readers.
//!
//! Each timeframe's state sits behind its own lock: the data source is the
//! single writer, UI and trading-flow threads read snapshots. Snapshots are
//! handed out as `Arc`s, so a reader always sees a complete value.

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use super::bar::{Bar, BarParseError, RawBar};
use super::history::DEFAULT_HISTORY_CAPACITY;
use super::math;
use super::state::{EmaState, IndicatorSnapshot, IngestOutcome, TimeframeState};
use crate::types::{Signal, Timeframe};

/// Indicator values relative to a reference price. Fields are present only
/// for indicators currently set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RelativeValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema9_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema9_diff_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap_diff_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_histogram: Option<f64>,
}

impl RelativeValues {
    fn against(price: f64, snapshot: &IndicatorSnapshot) -> Self {
        let mut values = Self::default();

        if snapshot.ema9 != 0.0 {
            values.ema9_diff = Some(price - snapshot.ema9);
            values.ema9_diff_pct = Some((price - snapshot.ema9) / snapshot.ema9 * 100.0);
        }
        if snapshot.vwap != 0.0 {
            values.vwap_diff = Some(price - snapshot.vwap);
            values.vwap_diff_pct = Some((price - snapshot.vwap) / snapshot.vwap * 100.0);
        }
        if snapshot.macd != 0.0 {
            values.macd = Some(snapshot.macd);
            values.macd_histogram = Some(snapshot.macd_histogram);
        }

        values
    }
}

pub struct IndicatorEngine {
    timeframes: [RwLock<TimeframeState>; 2],
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Engine retaining `capacity` bars per timeframe
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timeframes: Timeframe::ALL.map(|tf| RwLock::new(TimeframeState::new(tf, capacity))),
        }
    }

    fn state(&self, timeframe: Timeframe) -> &RwLock<TimeframeState> {
        &self.timeframes[timeframe.index()]
    }

    // Inbound

    /// Parse a raw bar from the data source and ingest it
    pub fn on_bar(&self, timeframe: Timeframe, raw: &RawBar) -> Result<IngestOutcome, BarParseError> {
        let bar = raw.to_bar()?;
        Ok(self.ingest(timeframe, bar))
    }

    pub fn ingest(&self, timeframe: Timeframe, bar: Bar) -> IngestOutcome {
        self.state(timeframe).write().ingest(bar)
    }

    /// Mark the start of a historical load for `timeframe`
    pub fn begin_backfill(&self, timeframe: Timeframe) {
        self.state(timeframe).write().begin_backfill();
    }

    /// End of historical load; produces the first snapshot if any bars arrived
    pub fn complete_backfill(&self, timeframe: Timeframe) -> Option<Arc<IndicatorSnapshot>> {
        self.state(timeframe).write().complete_backfill()
    }

    // Outbound

    pub fn snapshot(&self, timeframe: Timeframe) -> Option<Arc<IndicatorSnapshot>> {
        self.state(timeframe).read().snapshot()
    }

    /// 10s and 30s signals combined, weighted 60/40
    pub fn combined_signal(&self) -> Signal {
        let signal = |tf: Timeframe| self.snapshot(tf).map(|s| s.signal());
        math::combine_signals(signal(Timeframe::TenSeconds), signal(Timeframe::ThirtySeconds))
    }

    /// `None` until the timeframe has produced a snapshot
    pub fn relative_values(&self, price: f64, timeframe: Timeframe) -> Option<RelativeValues> {
        self.snapshot(timeframe)
            .map(|snapshot| RelativeValues::against(price, &snapshot))
    }

    pub fn last_update(&self, timeframe: Timeframe) -> Option<NaiveDateTime> {
        self.state(timeframe).read().last_update()
    }

    /// Close of the newest retained bar
    pub fn last_price(&self, timeframe: Timeframe) -> Option<f64> {
        self.state(timeframe).read().history().last().map(|bar| bar.close())
    }

    pub fn bar_count(&self, timeframe: Timeframe) -> usize {
        self.state(timeframe).read().history().len()
    }

    pub fn is_loading(&self, timeframe: Timeframe) -> bool {
        self.state(timeframe).read().is_loading()
    }

    pub fn ema_state(&self, timeframe: Timeframe) -> EmaState {
        self.state(timeframe).read().emas()
    }

    /// One-line summary for periodic status logging
    pub fn status(&self) -> String {
        let mut parts: Vec<String> = Timeframe::ALL
            .iter()
            .map(|&tf| match self.snapshot(tf) {
                Some(s) => format!(
                    "{tf} @ {} EMA9 {:.2} VWAP {:.2} MACD {:.4}/{:.4} {}",
                    s.timestamp.format("%H:%M:%S"),
                    s.ema9,
                    s.vwap,
                    s.macd,
                    s.macd_histogram,
                    s.signal()
                ),
                None if self.is_loading(tf) => format!("{tf} loading ({} bars)", self.bar_count(tf)),
                None => format!("{tf} waiting"),
            })
            .collect();
        parts.push(format!("combined {}", self.combined_signal()));
        parts.join(" | ")
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}
