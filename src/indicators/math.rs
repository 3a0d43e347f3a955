//! Indicator arithmetic: EMA, VWAP, MACD and the signal heuristic

use super::bar::Bar;
use crate::types::{Signal, SignalDirection, Timeframe};

pub const EMA_FAST_PERIOD: u32 = 9;
pub const MACD_FAST_PERIOD: u32 = 12;
pub const MACD_SLOW_PERIOD: u32 = 26;
pub const MACD_SIGNAL_PERIOD: u32 = 9;

/// Average vote beyond which the signal leaves NEUTRAL
const DIRECTION_THRESHOLD: f64 = 0.5;

/// Combined buy/sell score needed for a combined direction
const COMBINED_SCORE_THRESHOLD: f64 = 0.5;

/// Exponential moving average step. The first observation seeds the average.
pub fn ema(current: f64, previous: Option<f64>, period: u32) -> f64 {
    match previous {
        None => current,
        Some(previous) => {
            let k = 2.0 / (f64::from(period) + 1.0);
            current * k + previous * (1.0 - k)
        }
    }
}

/// Volume-weighted typical price over `bars`.
///
/// With zero total volume this falls back to the typical price of the last
/// bar, or 0 when there are no bars.
pub fn vwap<'a, I>(bars: I) -> f64
where
    I: IntoIterator<Item = &'a Bar>,
{
    let mut total_volume = 0.0;
    let mut total_pv = 0.0;
    let mut last = None;

    for bar in bars {
        let volume = bar.volume() as f64;
        total_volume += volume;
        total_pv += bar.typical_price() * volume;
        last = Some(bar);
    }

    if total_volume > 0.0 {
        total_pv / total_volume
    } else {
        last.map_or(0.0, |bar| bar.typical_price())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl MacdOutput {
    pub const ZERO: MacdOutput = MacdOutput {
        macd: 0.0,
        signal: 0.0,
        histogram: 0.0,
    };
}

/// MACD line, its signal line (9-period EMA of the MACD) and the histogram
pub fn macd(ema12: f64, ema26: f64, previous_signal: Option<f64>) -> MacdOutput {
    let macd = ema12 - ema26;
    let signal = ema(macd, previous_signal, MACD_SIGNAL_PERIOD);
    MacdOutput {
        macd,
        signal,
        histogram: macd - signal,
    }
}

/// Heuristic signal from price position against EMA9 and VWAP plus the
/// MACD histogram. Each available indicator casts one vote; the mean vote
/// decides direction and, scaled by 10, the strength.
pub fn extrapolate_signal(
    price: f64,
    ema9: Option<f64>,
    vwap: Option<f64>,
    macd: f64,
    histogram: f64,
) -> Signal {
    let mut votes = Vec::with_capacity(3);

    if let Some(ema9) = ema9.filter(|v| *v != 0.0) {
        votes.push((price - ema9) / ema9 * 100.0);
    }
    if let Some(vwap) = vwap.filter(|v| *v > 0.0) {
        votes.push((price - vwap) / vwap * 100.0);
    }
    if macd != 0.0 {
        votes.push(histogram * 10.0);
    }

    if votes.is_empty() {
        return Signal::neutral();
    }

    let avg = votes.iter().sum::<f64>() / votes.len() as f64;
    let strength = (avg.abs() * 10.0).min(100.0);
    let direction = if avg > DIRECTION_THRESHOLD {
        SignalDirection::Buy
    } else if avg < -DIRECTION_THRESHOLD {
        SignalDirection::Sell
    } else {
        SignalDirection::Neutral
    };

    Signal::new(strength, direction)
}

/// Weighted 10s/30s combination. A timeframe without a signal, or with zero
/// strength, does not take part.
pub fn combine_signals(ten_sec: Option<Signal>, thirty_sec: Option<Signal>) -> Signal {
    let ten_sec = ten_sec.filter(|s| s.strength != 0.0);
    let thirty_sec = thirty_sec.filter(|s| s.strength != 0.0);

    match (ten_sec, thirty_sec) {
        (None, None) => Signal::neutral(),
        (Some(only), None) | (None, Some(only)) => only,
        (Some(fast), Some(slow)) => {
            let weighted = [
                (fast, Timeframe::TenSeconds.weight()),
                (slow, Timeframe::ThirtySeconds.weight()),
            ];

            let strength: f64 = weighted.iter().map(|(s, w)| s.strength * w).sum();

            let mut buy_score = 0.0;
            let mut sell_score = 0.0;
            for (signal, weight) in weighted {
                match signal.direction {
                    SignalDirection::Buy => buy_score += weight,
                    SignalDirection::Sell => sell_score += weight,
                    SignalDirection::Neutral => {}
                }
            }

            let direction = if buy_score > sell_score && buy_score > COMBINED_SCORE_THRESHOLD {
                SignalDirection::Buy
            } else if sell_score > buy_score && sell_score > COMBINED_SCORE_THRESHOLD {
                SignalDirection::Sell
            } else {
                SignalDirection::Neutral
            };

            Signal::new(strength, direction)
        }
    }
}
