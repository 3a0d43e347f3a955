use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar cadence tracked by the indicator engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "10s")]
    TenSeconds,
    #[serde(rename = "30s")]
    ThirtySeconds,
}

impl Timeframe {
    pub const ALL: [Timeframe; 2] = [Timeframe::TenSeconds, Timeframe::ThirtySeconds];

    /// Bar length in seconds
    pub fn seconds(self) -> i64 {
        match self {
            Self::TenSeconds => 10,
            Self::ThirtySeconds => 30,
        }
    }

    /// Weight of this timeframe in the combined signal
    pub fn weight(self) -> f64 {
        match self {
            Self::TenSeconds => 0.6,
            Self::ThirtySeconds => 0.4,
        }
    }

    /// Default historical backfill requested on startup, in seconds
    pub fn default_backfill_secs(self) -> i32 {
        match self {
            Self::TenSeconds => 1800,
            Self::ThirtySeconds => 3600,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::TenSeconds => "10s",
            Self::ThirtySeconds => "30s",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::TenSeconds => 0,
            Self::ThirtySeconds => 1,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    // Accepts our labels as well as the TWS bar-size strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "10s" | "10 secs" | "10sec" => Ok(Self::TenSeconds),
            "30s" | "30 secs" | "30sec" => Ok(Self::ThirtySeconds),
            other => Err(format!("unsupported timeframe: {other}")),
        }
    }
}

/// Trading direction suggested by the indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
    #[default]
    Neutral,
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Signal strength (0-100) paired with a direction
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Signal {
    pub strength: f64,
    pub direction: SignalDirection,
}

impl Signal {
    pub fn new(strength: f64, direction: SignalDirection) -> Self {
        Self { strength, direction }
    }

    pub fn neutral() -> Self {
        Self::default()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.1})", self.direction, self.strength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!("10s".parse::<Timeframe>().unwrap(), Timeframe::TenSeconds);
        assert_eq!("30 secs".parse::<Timeframe>().unwrap(), Timeframe::ThirtySeconds);
        assert!("1 min".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = Timeframe::ALL.iter().map(|tf| tf.weight()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_direction_serializes_uppercase() {
        let json = serde_json::to_string(&SignalDirection::Buy).unwrap();
        assert_eq!(json, "\"BUY\"");
        assert_eq!(SignalDirection::Neutral.to_string(), "NEUTRAL");
    }
}
