//! Replays TWS-formatted bars from CSV through the engine
//!
//! Expected header: `timeframe,date,open,high,low,close,volume`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::indicators::{IndicatorEngine, IngestOutcome, RawBar};
use crate::types::Timeframe;

#[derive(Debug, Deserialize)]
struct ReplayRow {
    timeframe: String,
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl ReplayRow {
    fn into_parts(self) -> Result<(Timeframe, RawBar)> {
        let timeframe = self.timeframe.parse::<Timeframe>().map_err(anyhow::Error::msg)?;
        let raw = RawBar {
            date: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        };
        Ok((timeframe, raw))
    }
}

/// Counts of what the engine did with the replayed rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub rows: usize,
    pub recomputed: usize,
    pub buffered: usize,
    pub stale: usize,
}

/// Feed every row through `on_bar`. With `backfill`, both timeframes load
/// in backfill mode and are completed after the last row.
pub fn replay_csv<R: Read>(reader: R, engine: &IndicatorEngine, backfill: bool) -> Result<ReplaySummary> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut summary = ReplaySummary::default();

    if backfill {
        for timeframe in Timeframe::ALL {
            engine.begin_backfill(timeframe);
        }
    }

    for (i, row) in rdr.deserialize::<ReplayRow>().enumerate() {
        let line = i + 2;
        let (timeframe, raw) = row
            .map_err(anyhow::Error::from)
            .and_then(ReplayRow::into_parts)
            .with_context(|| format!("Invalid replay row at line {}", line))?;

        let outcome = engine
            .on_bar(timeframe, &raw)
            .with_context(|| format!("Invalid bar date at line {}", line))?;

        summary.rows += 1;
        match outcome {
            IngestOutcome::Recomputed(_) => summary.recomputed += 1,
            IngestOutcome::Buffered => summary.buffered += 1,
            IngestOutcome::Stale => summary.stale += 1,
        }
    }

    if backfill {
        for timeframe in Timeframe::ALL {
            engine.complete_backfill(timeframe);
        }
    }

    info!(
        "Replayed {} rows: {} recalculated, {} buffered, {} stale",
        summary.rows, summary.recomputed, summary.buffered, summary.stale
    );
    Ok(summary)
}

pub fn replay_file(path: &Path, engine: &IndicatorEngine, backfill: bool) -> Result<ReplaySummary> {
    let file = File::open(path).with_context(|| format!("Failed to open replay file {:?}", path))?;
    replay_csv(file, engine, backfill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SESSION: &str = "\
timeframe,date,open,high,low,close,volume
10s,20240109 09:30:00 America/New_York,150.00,150.20,149.95,150.10,5000
10s,20240109 09:30:10 America/New_York,150.10,150.30,150.05,150.25,6000
30s,20240109 09:30:00 America/New_York,150.00,150.30,149.95,150.25,11000
10s,20240109 09:30:10 America/New_York,150.10,150.30,150.05,150.25,6000
10s,20240109 09:30:20 America/New_York,150.25,150.40,150.20,150.35,5500.5
";

    #[test]
    fn test_live_replay() {
        let engine = IndicatorEngine::new();
        let summary = replay_csv(SESSION.as_bytes(), &engine, false).unwrap();

        assert_eq!(
            summary,
            ReplaySummary {
                rows: 5,
                recomputed: 4,
                buffered: 0,
                stale: 1,
            }
        );
        assert_eq!(engine.bar_count(Timeframe::TenSeconds), 3);
        assert_eq!(engine.bar_count(Timeframe::ThirtySeconds), 1);
    }

    #[test]
    fn test_backfill_replay_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SESSION.as_bytes()).unwrap();

        let engine = IndicatorEngine::new();
        let summary = replay_file(file.path(), &engine, true).unwrap();

        assert_eq!(summary.recomputed, 0);
        assert_eq!(summary.buffered, 4);
        for timeframe in Timeframe::ALL {
            assert!(!engine.is_loading(timeframe));
            assert!(engine.snapshot(timeframe).is_some());
        }
    }

    #[test]
    fn test_bad_rows_report_line() {
        let engine = IndicatorEngine::new();

        let bad_date = "timeframe,date,open,high,low,close,volume\n10s,2024-01-09,1,1,1,1,1\n";
        let err = replay_csv(bad_date.as_bytes(), &engine, false).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let bad_timeframe = "timeframe,date,open,high,low,close,volume\n1m,20240109,1,1,1,1,1\n";
        let err = replay_csv(bad_timeframe.as_bytes(), &engine, false).unwrap_err();
        assert!(format!("{err:#}").contains("unsupported timeframe"));
    }
}
