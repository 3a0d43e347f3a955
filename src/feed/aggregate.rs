//! Rolls base-cadence bars (IB delivers 5-second bars) into timeframe bars

use chrono::{DateTime, NaiveDateTime};
use tracing::debug;

use crate::indicators::Bar;
use crate::types::Timeframe;

struct BarBuilder {
    bucket: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

impl BarBuilder {
    fn new(bucket: i64, bar: &Bar) -> Self {
        Self {
            bucket,
            open: bar.open(),
            high: bar.high(),
            low: bar.low(),
            close: bar.close(),
            volume: bar.volume(),
        }
    }

    fn add(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high());
        self.low = self.low.min(bar.low());
        self.close = bar.close();
        self.volume += bar.volume();
    }

    fn to_bar(&self) -> Option<Bar> {
        let timestamp = DateTime::from_timestamp(self.bucket, 0)?.naive_utc();
        Some(Bar::new(timestamp, self.open, self.high, self.low, self.close, self.volume))
    }
}

/// Aggregates bars into fixed buckets of one timeframe
pub struct BarAggregator {
    timeframe: Timeframe,
    current: Option<BarBuilder>,
    /// Newest base bar accepted so far
    last_base: Option<NaiveDateTime>,
}

impl BarAggregator {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            current: None,
            last_base: None,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn bucket_of(&self, timestamp: NaiveDateTime) -> i64 {
        let secs = timestamp.and_utc().timestamp();
        secs - secs.rem_euclid(self.timeframe.seconds())
    }

    /// Add a base bar; returns the completed timeframe bar when `bar` opens
    /// a new bucket. Base bars not strictly newer than the last accepted one
    /// are dropped, so a bar seen in both history and the live stream
    /// counts once.
    pub fn push(&mut self, bar: &Bar) -> Option<Bar> {
        if self.last_base.is_some_and(|last| bar.timestamp() <= last) {
            debug!("{} aggregator: dropping repeated or out-of-order bar at {}", self.timeframe, bar.timestamp());
            return None;
        }
        self.last_base = Some(bar.timestamp());

        let bucket = self.bucket_of(bar.timestamp());

        match &mut self.current {
            Some(current) if bucket == current.bucket => {
                current.add(bar);
                None
            }
            Some(current) => {
                let completed = current.to_bar();
                self.current = Some(BarBuilder::new(bucket, bar));
                completed
            }
            None => {
                self.current = Some(BarBuilder::new(bucket, bar));
                None
            }
        }
    }

    /// Emit the in-progress bar, if any
    pub fn flush(&mut self) -> Option<Bar> {
        self.current.take().and_then(|current| current.to_bar())
    }
}
