use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use trade_assist::feed::{replay_file, IbBarFeed, ReplaySummary};
use trade_assist::{FeedConfig, IndicatorEngine, IndicatorSnapshot, Signal, Timeframe};

#[derive(Parser, Debug)]
#[command(name = "trade-assist")]
#[command(about = "EMA/VWAP/MACD signals on 10s and 30s bars")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream bars from TWS/Gateway and log indicator status
    Live {
        /// TWS/Gateway host
        #[arg(long, env = "IB_HOST", default_value = "127.0.0.1")]
        host: String,

        /// TWS/Gateway port (paper: 7497, live: 7496)
        #[arg(long, env = "IB_PORT", default_value = "7497")]
        port: u16,

        /// Client ID (must be unique per connection)
        #[arg(long, env = "IB_CLIENT_ID", default_value = "1")]
        client_id: i32,

        /// Stock symbol
        #[arg(short, long, env = "SYMBOL")]
        symbol: String,

        /// Exchange time zone for bar timestamps
        #[arg(long, env = "IB_TIME_ZONE", default_value = "America/New_York")]
        tz: String,

        /// Historical backfill for 10-second bars (seconds)
        #[arg(long, env = "BACKFILL_10S", default_value_t = Timeframe::TenSeconds.default_backfill_secs())]
        backfill_10s: i32,

        /// Historical backfill for 30-second bars (seconds)
        #[arg(long, env = "BACKFILL_30S", default_value_t = Timeframe::ThirtySeconds.default_backfill_secs())]
        backfill_30s: i32,

        /// Seconds between status lines
        #[arg(long, env = "STATUS_SECS", default_value = "30")]
        status_secs: u64,
    },

    /// Replay TWS-formatted bars from a CSV file
    Replay {
        /// CSV with header timeframe,date,open,high,low,close,volume
        file: PathBuf,

        /// Load the file as a historical backfill
        #[arg(long)]
        backfill: bool,

        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct ReplayReport {
    summary: ReplaySummary,
    snapshot_10s: Option<IndicatorSnapshot>,
    snapshot_30s: Option<IndicatorSnapshot>,
    combined: Signal,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trade_assist=info".parse()?),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Live {
            host,
            port,
            client_id,
            symbol,
            tz,
            backfill_10s,
            backfill_30s,
            status_secs,
        } => {
            let time_zone = tz
                .parse::<Tz>()
                .map_err(|e| anyhow!("Invalid time zone {}: {}", tz, e))?;
            let config = FeedConfig {
                host,
                port,
                client_id,
                symbol,
                time_zone,
                backfill_10s,
                backfill_30s,
            };
            run_live(config, status_secs).await
        }
        Commands::Replay { file, backfill, json } => run_replay(file, backfill, json),
    }
}

async fn run_live(config: FeedConfig, status_secs: u64) -> Result<()> {
    info!("Symbol: {}", config.symbol);
    info!(
        "Backfill: 10s bars {} s, 30s bars {} s",
        config.backfill_10s, config.backfill_30s
    );

    let engine = Arc::new(IndicatorEngine::new());
    let stop = Arc::new(AtomicBool::new(false));

    let feed = IbBarFeed::new(config, engine.clone());
    let feed_stop = stop.clone();
    let mut feed_task = tokio::task::spawn_blocking(move || feed.run(&feed_stop));

    let mut ticker = tokio::time::interval(Duration::from_secs(status_secs.max(1)));

    loop {
        tokio::select! {
            result = &mut feed_task => {
                return result.context("Feed task failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                stop.store(true, Ordering::Relaxed);
                break;
            }
            _ = ticker.tick() => log_status(&engine),
        }
    }

    // The feed notices the stop flag on its next bar
    match tokio::time::timeout(Duration::from_secs(10), feed_task).await {
        Ok(result) => result.context("Feed task failed")?,
        Err(_) => {
            warn!("Feed did not stop within 10s, exiting anyway");
            Ok(())
        }
    }
}

fn log_status(engine: &IndicatorEngine) {
    info!("{}", engine.status());

    for timeframe in Timeframe::ALL {
        let Some(price) = engine.last_price(timeframe) else {
            continue;
        };
        let Some(values) = engine.relative_values(price, timeframe) else {
            continue;
        };
        match serde_json::to_string(&values) {
            Ok(values) => info!("{} relative to {:.2}: {}", timeframe, price, values),
            Err(e) => warn!("Failed to serialize {} relative values: {}", timeframe, e),
        }
    }
}

fn run_replay(file: PathBuf, backfill: bool, json: bool) -> Result<()> {
    let engine = IndicatorEngine::new();
    let summary = replay_file(&file, &engine, backfill)?;

    let snapshot = |tf: Timeframe| engine.snapshot(tf).map(|s| IndicatorSnapshot::clone(&s));
    let report = ReplayReport {
        summary,
        snapshot_10s: snapshot(Timeframe::TenSeconds),
        snapshot_30s: snapshot(Timeframe::ThirtySeconds),
        combined: engine.combined_signal(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Replayed {} rows ({} recalculated, {} buffered, {} stale)",
            summary.rows, summary.recomputed, summary.buffered, summary.stale
        );
        println!("{}", engine.status());
    }

    Ok(())
}
