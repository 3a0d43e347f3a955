//! Interactive Brokers bar feed
//!
//! Subscribes to 5-second real-time bars first, backfills each timeframe
//! from 5-second historical bars while the live bars queue up, then drains
//! the subscription. Both paths go through the same aggregation into
//! 10s/30s bars, which drops base bars seen twice at the seam.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use ibapi::contracts::{Contract, SecurityType};
use ibapi::market_data::historical::{BarSize as HistBarSize, ToDuration, WhatToShow as HistWhatToShow};
use ibapi::market_data::realtime::{BarSize, WhatToShow};
use ibapi::Client;

use super::aggregate::BarAggregator;
use crate::config::FeedConfig;
use crate::indicators::bar::truncate_volume;
use crate::indicators::{Bar, IndicatorEngine};
use crate::types::Timeframe;

/// Stock contract routed SMART in USD
pub fn create_stock_contract(symbol: &str) -> Contract {
    Contract {
        symbol: symbol.to_string(),
        security_type: SecurityType::Stock,
        exchange: "SMART".to_string(),
        currency: "USD".to_string(),
        ..Default::default()
    }
}

/// Convert an IB bar time (unix seconds + nanos) to wall-clock time in `tz`
pub fn to_wall_clock(unix_secs: i64, nanos: u32, tz: Tz) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(unix_secs, nanos).map(|utc| utc.with_timezone(&tz).naive_local())
}

fn base_bar(tz: Tz, unix_secs: i64, nanos: u32, ohlc: [f64; 4], volume: f64) -> Option<Bar> {
    let timestamp = to_wall_clock(unix_secs, nanos, tz)?;
    let [open, high, low, close] = ohlc;
    Some(Bar::new(timestamp, open, high, low, close, truncate_volume(volume)))
}

pub struct IbBarFeed {
    config: FeedConfig,
    engine: Arc<IndicatorEngine>,
}

impl IbBarFeed {
    pub fn new(config: FeedConfig, engine: Arc<IndicatorEngine>) -> Self {
        Self { config, engine }
    }

    /// Connect, backfill both timeframes, then stream until `stop` is set.
    /// Fails if the real-time stream ends on its own.
    pub fn run(&self, stop: &AtomicBool) -> Result<()> {
        let url = self.config.connection_url();
        info!("Connecting to IB at {}...", url);

        let client = Client::connect(&url, self.config.client_id)
            .context("Failed to connect to IB TWS/Gateway. Make sure TWS or IB Gateway is running.")?;
        info!("Connected to IB");

        let contract = create_stock_contract(&self.config.symbol);

        // Live bars arriving during backfill wait on the subscription
        let subscription = client
            .realtime_bars(&contract, BarSize::Sec5, WhatToShow::Trades, false)
            .context("Failed to subscribe to real-time bars")?;
        info!("Subscribed to 5-second real-time bars for {}", self.config.symbol);

        let mut aggregators = Vec::with_capacity(Timeframe::ALL.len());
        for timeframe in Timeframe::ALL {
            aggregators.push(self.backfill(&client, &contract, timeframe)?);
        }
        info!("Started technical analysis for {}", self.config.symbol);

        let tz = self.config.time_zone;
        let bars = subscription.into_iter().filter_map(|ib_bar| {
            let ohlc = [ib_bar.open, ib_bar.high, ib_bar.low, ib_bar.close];
            let bar = base_bar(tz, ib_bar.date.unix_timestamp(), ib_bar.date.nanosecond(), ohlc, ib_bar.volume);
            if bar.is_none() {
                warn!("Skipping real-time bar with out-of-range time {}", ib_bar.date);
            }
            bar
        });

        stream(&self.engine, bars, &mut aggregators, stop)?;
        info!("Stopped technical analysis");
        Ok(())
    }

    /// Load history for one timeframe. The returned aggregator holds the
    /// in-progress bucket, which the real-time stream completes.
    fn backfill(&self, client: &Client, contract: &Contract, timeframe: Timeframe) -> Result<BarAggregator> {
        let duration = self.config.backfill_secs(timeframe);
        info!("Requesting {} bars for {} ({} s)", timeframe, self.config.symbol, duration);

        self.engine.begin_backfill(timeframe);

        let history = client
            .historical_data(
                contract,
                None,
                duration.seconds(),
                HistBarSize::Sec5,
                HistWhatToShow::Trades,
                false,
            )
            .with_context(|| format!("Historical {} request for {} failed", timeframe, self.config.symbol))?;

        let mut aggregator = BarAggregator::new(timeframe);
        for ib_bar in &history.bars {
            let ohlc = [ib_bar.open, ib_bar.high, ib_bar.low, ib_bar.close];
            let Some(bar) = base_bar(
                self.config.time_zone,
                ib_bar.date.unix_timestamp(),
                ib_bar.date.nanosecond(),
                ohlc,
                ib_bar.volume,
            ) else {
                warn!("Skipping historical bar with out-of-range time {}", ib_bar.date);
                continue;
            };
            if let Some(completed) = aggregator.push(&bar) {
                self.engine.ingest(timeframe, completed);
            }
        }

        info!(
            "{} bars initialized: {} bars from {} base bars",
            timeframe,
            self.engine.bar_count(timeframe),
            history.bars.len()
        );
        self.engine.complete_backfill(timeframe);

        Ok(aggregator)
    }
}

/// Push live base bars through every aggregator until `stop` is set or the
/// bars run out, then ingest the pending bars. Running out without a stop
/// request is an error.
fn stream<I>(engine: &IndicatorEngine, bars: I, aggregators: &mut [BarAggregator], stop: &AtomicBool) -> Result<()>
where
    I: IntoIterator<Item = Bar>,
{
    for bar in bars {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        for aggregator in aggregators.iter_mut() {
            if let Some(completed) = aggregator.push(&bar) {
                engine.ingest(aggregator.timeframe(), completed);
            }
        }
    }

    flush_into(engine, aggregators);

    if !stop.load(Ordering::Relaxed) {
        bail!("Real-time bar stream ended unexpectedly");
    }
    Ok(())
}

fn flush_into(engine: &IndicatorEngine, aggregators: &mut [BarAggregator]) {
    for aggregator in aggregators.iter_mut() {
        if let Some(pending) = aggregator.flush() {
            debug!("{} flushing pending bar at {}", aggregator.timeframe(), pending.timestamp());
            engine.ingest(aggregator.timeframe(), pending);
        }
    }
}
