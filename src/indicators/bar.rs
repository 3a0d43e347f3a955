//! OHLCV bars and TWS date parsing

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_TIME_FORMAT: &str = "%Y%m%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum BarParseError {
    #[error("empty bar date")]
    Empty,
    #[error("unknown time zone suffix '{0}'")]
    UnknownZone(String),
    #[error("unrecognized bar date format '{0}'")]
    Format(String),
    #[error("invalid bar date '{input}': {source}")]
    Invalid {
        input: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// One OHLCV sample for a fixed timeframe. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    timestamp: NaiveDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
    typical_price: f64,
}

impl Bar {
    pub fn new(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            typical_price: (high + low + close) / 3.0,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn open(&self) -> f64 {
        self.open
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn close(&self) -> f64 {
        self.close
    }

    pub fn volume(&self) -> u64 {
        self.volume
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        self.typical_price
    }
}

/// Bar as delivered by the data source, before date parsing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBar {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// IB reports volume as a decimal
    pub volume: f64,
}

impl RawBar {
    pub fn to_bar(&self) -> Result<Bar, BarParseError> {
        let timestamp = parse_bar_time(&self.date)?;
        Ok(Bar::new(
            timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            truncate_volume(self.volume),
        ))
    }
}

/// Truncate a decimal volume toward zero. Negative or non-finite volume is 0.
pub fn truncate_volume(volume: f64) -> u64 {
    if volume.is_finite() && volume > 0.0 {
        volume.trunc() as u64
    } else {
        0
    }
}

/// Parse a TWS bar date: `YYYYMMDD` or `YYYYMMDD HH:MM:SS`, optionally
/// followed by a time zone name which is discarded.
pub fn parse_bar_time(input: &str) -> Result<NaiveDateTime, BarParseError> {
    let mut tokens: Vec<&str> = input.split_whitespace().collect();

    if tokens.len() > 1 {
        if let Some(&last) = tokens.last() {
            if !last.starts_with(|c: char| c.is_ascii_digit()) {
                if last.parse::<Tz>().is_err() {
                    return Err(BarParseError::UnknownZone(last.to_string()));
                }
                tokens.pop();
            }
        }
    }

    let invalid = |source: chrono::ParseError| BarParseError::Invalid {
        input: input.to_string(),
        source,
    };

    match tokens.as_slice() {
        [] => Err(BarParseError::Empty),
        [date] => {
            let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(invalid)?;
            Ok(date.and_time(NaiveTime::MIN))
        }
        [date, time] => {
            NaiveDateTime::parse_from_str(&format!("{date} {time}"), DATE_TIME_FORMAT).map_err(invalid)
        }
        _ => Err(BarParseError::Format(input.to_string())),
    }
}
