//! Configuration for the bar-data feed

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::Timeframe;

/// Connection and request settings for the IB bar feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// TWS/Gateway host
    pub host: String,

    /// TWS/Gateway port (paper: 7497, live: 7496)
    pub port: u16,

    /// Client ID (must be unique per connection)
    pub client_id: i32,

    /// Stock symbol, routed SMART in USD
    pub symbol: String,

    /// Exchange time zone; bar timestamps are wall-clock times in this zone
    pub time_zone: Tz,

    /// Historical backfill for 10-second bars, in seconds
    pub backfill_10s: i32,

    /// Historical backfill for 30-second bars, in seconds
    pub backfill_30s: i32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7497,
            client_id: 1,
            symbol: "SPY".to_string(),
            time_zone: chrono_tz::America::New_York,
            backfill_10s: Timeframe::TenSeconds.default_backfill_secs(),
            backfill_30s: Timeframe::ThirtySeconds.default_backfill_secs(),
        }
    }
}

impl FeedConfig {
    pub fn connection_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn backfill_secs(&self, timeframe: Timeframe) -> i32 {
        match timeframe {
            Timeframe::TenSeconds => self.backfill_10s,
            Timeframe::ThirtySeconds => self.backfill_30s,
        }
    }
}
