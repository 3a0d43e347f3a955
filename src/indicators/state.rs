//! Per-timeframe indicator state: bar history, running EMAs and the
//! latest snapshot.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::bar::Bar;
use super::history::BarHistory;
use super::math::{self, MacdOutput};
use crate::types::{Signal, SignalDirection, Timeframe};

/// Bars logged individually at the start of a timeframe's history
const LOGGED_LEADING_BARS: usize = 3;

/// Result of one recalculation. Replaced wholesale, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub timestamp: NaiveDateTime,
    pub ema9: f64,
    pub vwap: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub signal_strength: f64,
    pub signal_direction: SignalDirection,
}

impl IndicatorSnapshot {
    pub fn signal(&self) -> Signal {
        Signal::new(self.signal_strength, self.signal_direction)
    }
}

/// Running exponential averages, unset until the first close is seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EmaState {
    pub ema9: Option<f64>,
    pub ema12: Option<f64>,
    pub ema26: Option<f64>,
    pub macd_signal: Option<f64>,
}

impl EmaState {
    /// Step ema9/ema12/ema26 with a close; returns the new ema9
    fn advance(&mut self, close: f64) -> f64 {
        let ema9 = math::ema(close, self.ema9, math::EMA_FAST_PERIOD);
        self.ema9 = Some(ema9);
        self.ema12 = Some(math::ema(close, self.ema12, math::MACD_FAST_PERIOD));
        self.ema26 = Some(math::ema(close, self.ema26, math::MACD_SLOW_PERIOD));
        ema9
    }
}

/// What `ingest` did with a bar
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Appended and indicators recalculated
    Recomputed(Arc<IndicatorSnapshot>),
    /// Appended during backfill, recalculation deferred
    Buffered,
    /// Not newer than the last stored bar; dropped
    Stale,
}

#[derive(Debug)]
pub struct TimeframeState {
    timeframe: Timeframe,
    history: BarHistory,
    emas: EmaState,
    snapshot: Option<Arc<IndicatorSnapshot>>,
    last_update: Option<NaiveDateTime>,
    loading: bool,
}

impl TimeframeState {
    pub fn new(timeframe: Timeframe, capacity: usize) -> Self {
        Self {
            timeframe,
            history: BarHistory::new(capacity),
            emas: EmaState::default(),
            snapshot: None,
            last_update: None,
            loading: false,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn history(&self) -> &BarHistory {
        &self.history
    }

    pub fn emas(&self) -> EmaState {
        self.emas
    }

    pub fn snapshot(&self) -> Option<Arc<IndicatorSnapshot>> {
        self.snapshot.clone()
    }

    pub fn last_update(&self) -> Option<NaiveDateTime> {
        self.last_update
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Enter backfill mode. Averages restart from scratch; retained bars
    /// stay and are replayed by `complete_backfill`.
    pub fn begin_backfill(&mut self) {
        self.loading = true;
        self.emas = EmaState::default();
        self.snapshot = None;
        self.last_update = None;
        debug!("{} backfill started ({} bars retained)", self.timeframe, self.history.len());
    }

    /// Append a bar if it is strictly newer than the last stored one, then
    /// recalculate unless backfilling.
    pub fn ingest(&mut self, bar: Bar) -> IngestOutcome {
        let is_new = self
            .history
            .last()
            .map_or(true, |last| bar.timestamp() > last.timestamp());

        if !is_new {
            debug!("{} bar at {} is not newer than the last bar, skipping", self.timeframe, bar.timestamp());
            return IngestOutcome::Stale;
        }

        let timestamp = bar.timestamp();
        let close = bar.close();
        debug!(
            "{} bar: {} C:{:.2} V:{}",
            self.timeframe,
            timestamp,
            close,
            bar.volume()
        );
        self.history.push(bar);

        if self.history.len() <= LOGGED_LEADING_BARS {
            info!("{} bar #{}: {} C:{:.2}", self.timeframe, self.history.len(), timestamp, close);
        }

        if self.loading {
            return IngestOutcome::Buffered;
        }

        IngestOutcome::Recomputed(self.recompute(timestamp, close))
    }

    /// Leave backfill mode: advance the averages through every retained bar
    /// but the last, then run one full recalculation on the last bar.
    pub fn complete_backfill(&mut self) -> Option<Arc<IndicatorSnapshot>> {
        if !self.loading {
            warn!("{} backfill completed while not loading, ignoring", self.timeframe);
            return None;
        }
        self.loading = false;

        let Some(last) = self.history.last() else {
            warn!("No {} bars received for initialization", self.timeframe);
            return None;
        };
        let (timestamp, close) = (last.timestamp(), last.close());
        let warmup = self.history.len() - 1;

        for bar in self.history.iter().take(warmup) {
            self.emas.advance(bar.close());
        }

        let snapshot = self.recompute(timestamp, close);
        info!(
            "{} indicators initialized from {} bars: EMA9={:.2}",
            self.timeframe,
            self.history.len(),
            snapshot.ema9
        );
        Some(snapshot)
    }

    fn recompute(&mut self, timestamp: NaiveDateTime, price: f64) -> Arc<IndicatorSnapshot> {
        let ema9 = self.emas.advance(price);
        let vwap = math::vwap(self.history.iter());

        let macd = match (self.emas.ema12, self.emas.ema26) {
            (Some(ema12), Some(ema26)) => {
                let out = math::macd(ema12, ema26, self.emas.macd_signal);
                self.emas.macd_signal = Some(out.signal);
                out
            }
            _ => MacdOutput::ZERO,
        };

        let signal = math::extrapolate_signal(price, Some(ema9), Some(vwap), macd.macd, macd.histogram);

        let snapshot = Arc::new(IndicatorSnapshot {
            timestamp,
            ema9,
            vwap,
            macd: macd.macd,
            macd_signal: macd.signal,
            macd_histogram: macd.histogram,
            signal_strength: signal.strength,
            signal_direction: signal.direction,
        });

        info!(
            "{} indicators recalculated at {} - EMA9: {:.2}, VWAP: {:.2}, MACD: {:.4}, signal: {}",
            self.timeframe,
            timestamp.format("%H:%M:%S"),
            ema9,
            vwap,
            macd.macd,
            signal.direction
        );

        self.snapshot = Some(snapshot.clone());
        self.last_update = Some(timestamp);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::history::DEFAULT_HISTORY_CAPACITY;
    use chrono::{Duration, NaiveDate};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 9)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let ts = start + Duration::seconds(10 * i as i64);
                Bar::new(ts, close, close + 0.1, close - 0.1, close, 1000 + i as u64)
            })
            .collect()
    }

    fn state() -> TimeframeState {
        TimeframeState::new(Timeframe::TenSeconds, DEFAULT_HISTORY_CAPACITY)
    }

    #[test]
    fn test_first_bar_seeds_everything() {
        let mut tf = state();
        let bar = bars(&[100.0]).remove(0);

        let IngestOutcome::Recomputed(snapshot) = tf.ingest(bar) else {
            panic!("expected recompute");
        };
        assert_eq!(snapshot.ema9, 100.0);
        assert_eq!(snapshot.macd, 0.0);
        assert_eq!(snapshot.macd_histogram, 0.0);
        assert!((snapshot.vwap - 100.0).abs() < 1e-9);
        assert_eq!(snapshot.signal_direction, SignalDirection::Neutral);
        assert_eq!(tf.emas().macd_signal, Some(0.0));
    }

    #[test]
    fn test_duplicate_and_older_bars_dropped() {
        let mut tf = state();
        let series = bars(&[100.0, 101.0]);

        assert!(matches!(tf.ingest(series[1].clone()), IngestOutcome::Recomputed(_)));
        let before = tf.snapshot().unwrap();

        assert_eq!(tf.ingest(series[1].clone()), IngestOutcome::Stale);
        assert_eq!(tf.ingest(series[0].clone()), IngestOutcome::Stale);

        assert_eq!(tf.history().len(), 1);
        assert!(Arc::ptr_eq(&before, &tf.snapshot().unwrap()));
    }

    #[test]
    fn test_backfill_defers_recompute() {
        let mut tf = state();
        tf.begin_backfill();

        for bar in bars(&[100.0, 101.0, 102.0]) {
            assert_eq!(tf.ingest(bar), IngestOutcome::Buffered);
        }
        assert!(tf.snapshot().is_none());
        assert_eq!(tf.emas(), EmaState::default());

        let snapshot = tf.complete_backfill().unwrap();
        assert!(!tf.is_loading());
        assert_eq!(snapshot.timestamp, tf.history().last().unwrap().timestamp());
        assert_eq!(tf.last_update(), Some(snapshot.timestamp));
    }

    #[test]
    fn test_backfill_matches_live_averages() {
        let closes = [150.0, 150.4, 149.8, 150.9, 151.3, 150.7, 151.8, 152.0, 151.1, 152.6];
        let series = bars(&closes);

        let mut live = state();
        let live_snapshots = series
            .iter()
            .filter(|bar| matches!(live.ingest((*bar).clone()), IngestOutcome::Recomputed(_)))
            .count();

        let mut backfilled = state();
        backfilled.begin_backfill();
        let buffered_snapshots = series
            .iter()
            .filter(|bar| matches!(backfilled.ingest((*bar).clone()), IngestOutcome::Recomputed(_)))
            .count();
        let finished = backfilled.complete_backfill();

        assert_eq!(live_snapshots, closes.len());
        assert_eq!(buffered_snapshots, 0);
        assert!(finished.is_some());

        let (a, b) = (live.emas(), backfilled.emas());
        assert_eq!(a.ema9, b.ema9);
        assert_eq!(a.ema12, b.ema12);
        assert_eq!(a.ema26, b.ema26);

        let (a, b) = (live.snapshot().unwrap(), finished.unwrap());
        assert_eq!(a.ema9, b.ema9);
        assert_eq!(a.vwap, b.vwap);
    }

    #[test]
    fn test_empty_backfill_produces_nothing() {
        let mut tf = state();
        tf.begin_backfill();
        assert!(tf.complete_backfill().is_none());
        assert!(!tf.is_loading());
        assert_eq!(tf.emas(), EmaState::default());
    }

    #[test]
    fn test_complete_backfill_when_not_loading_is_ignored() {
        let mut tf = state();
        for bar in bars(&[100.0, 101.0]) {
            tf.ingest(bar);
        }
        let emas = tf.emas();

        assert!(tf.complete_backfill().is_none());
        assert_eq!(tf.emas(), emas);
    }

    #[test]
    fn test_rebackfill_restarts_averages() {
        let series = bars(&[100.0, 101.0, 102.0, 103.0]);
        let mut tf = state();
        tf.begin_backfill();
        for bar in &series[..3] {
            tf.ingest(bar.clone());
        }
        tf.complete_backfill();

        // Reconnect: the source re-sends history plus one new bar
        tf.begin_backfill();
        for bar in &series {
            tf.ingest(bar.clone());
        }
        tf.complete_backfill();

        let mut fresh = state();
        for bar in series {
            fresh.ingest(bar);
        }
        assert_eq!(tf.history().len(), 4);
        assert_eq!(tf.emas().ema26, fresh.emas().ema26);
    }
}
