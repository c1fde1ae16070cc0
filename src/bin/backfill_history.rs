//! Historical backfill for meter usage readings.
//!
//! Repeatedly runs sync cycles until the portal's history floor is
//! confirmed or the configured maximum lookback is covered. Each cycle is
//! bounded by `max_backfill_windows_per_cycle`, so this binary is how a
//! fresh installation walks a year-plus of history without hammering the
//! unofficial endpoint in one burst.
//!
//! Progress lives in the series state file: the planner re-derives the
//! remaining walk from merged coverage, so an interrupted run resumes
//! exactly where it stopped.
//!
//! Usage:
//!   cargo run --release --bin backfill_history
//!   cargo run --release --bin backfill_history -- --config my.toml
//!
//! Environment:
//!   ITRON_PASSWORD - portal password, if not present in the config file

use itron_sync::config::{self, DEFAULT_CONFIG_PATH};
use itron_sync::series::SeriesState;
use itron_sync::sync::SyncEngine;
use std::env;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const STATE_FILE: &str = "series_state.json";

/// Pause between cycles. The portal is rate-sensitive; this keeps a full
/// two-year walk spread over a couple of minutes instead of one burst.
const CYCLE_PAUSE: Duration = Duration::from_secs(5);

/// Hard cap on cycles per invocation, in case the portal keeps answering
/// with partial data and the floor is never confirmed.
const MAX_CYCLES: usize = 50;

// ---------------------------------------------------------------------------
// State management
// ---------------------------------------------------------------------------

/// Load persisted series state from disk, starting fresh if missing.
fn load_state(path: &str) -> Result<SeriesState, Box<dyn Error>> {
    if !Path::new(path).exists() {
        println!("📋 No state file found, starting a fresh backfill");
        return Ok(SeriesState::new());
    }

    let contents = fs::read_to_string(path)?;
    let series: SeriesState = serde_json::from_str(&contents)?;

    println!("📋 Loaded state:");
    println!("   Readings: {}", series.len());
    println!("   Floor: {:?}", series.backfill_floor());

    Ok(series)
}

/// Save series state to disk.
fn save_state(path: &str, series: &SeriesState) -> Result<(), Box<dyn Error>> {
    fs::write(path, serde_json::to_string_pretty(series)?)?;
    println!("💾 Saved state to {}", path);
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    println!("📥 Historical Meter Backfill");
    println!("============================\n");

    let args: Vec<String> = env::args().collect();
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_path = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: --config requires a path");
                    std::process::exit(1);
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--config PATH]", args[0]);
                std::process::exit(1);
            }
        }
    }

    let config = config::load_config(&config_path);
    let engine = SyncEngine::from_config(&config);

    let series = match load_state(STATE_FILE) {
        Ok(series) => series,
        Err(e) => {
            eprintln!("❌ Failed to load {}: {}", STATE_FILE, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = engine.import_series(series) {
        eprintln!("❌ Failed to import series state: {}", e);
        std::process::exit(1);
    }

    println!("\n🔄 Walking history (≤{} chunk(s) per cycle)...\n", config.max_backfill_windows_per_cycle);

    for cycle in 1..=MAX_CYCLES {
        let result = match engine.run_cycle() {
            Ok(result) => result,
            Err(e) => {
                eprintln!("❌ Cycle {} failed: {}", cycle, e);
                std::process::exit(1);
            }
        };

        let coverage = match (result.series.earliest_date(), result.series.latest_date()) {
            (Some(first), Some(last)) => format!("{} to {}", first, last),
            _ => "empty".to_string(),
        };
        println!(
            "   ✓ Cycle {}: {} readings, coverage {}{}",
            cycle,
            result.series.len(),
            coverage,
            if result.errors.is_empty() {
                String::new()
            } else {
                format!(", {} window(s) failed", result.errors.len())
            }
        );

        if let Err(e) = save_state(STATE_FILE, &result.series) {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }

        if let Some(floor) = result.series.backfill_floor() {
            println!("\n✅ History floor confirmed: no portal data before {}", floor);
            println!("   Backfill complete after {} cycle(s)", cycle);
            return;
        }

        // No floor yet — the walk may instead have hit the lookback bound,
        // past which the planner stops emitting backward windows.
        if result.errors.is_empty() {
            if let Some(earliest) = result.series.earliest_date() {
                let lookback_reached = (chrono::Utc::now().date_naive() - earliest).num_days()
                    >= config.max_lookback_days as i64;
                if lookback_reached {
                    println!("\n✅ Maximum lookback ({} days) covered", config.max_lookback_days);
                    return;
                }
            }
        }

        thread::sleep(CYCLE_PAUSE);
    }

    println!("\n⚠️  Stopped after {} cycles without confirming the floor", MAX_CYCLES);
    println!("   Re-run to continue; progress is saved in {}", STATE_FILE);
}
