//! Water Meter Sync - One-Shot Cycle Driver
//!
//! Runs a single sync cycle against the configured municipality portal and
//! prints the resulting series summary and usage statistics. The host
//! platform normally drives the engine through its own scheduler; this
//! binary is the "run now" entry point for provisioning checks and
//! diagnostics.
//!
//! Usage:
//!   cargo run --release                          # meter.toml, no state file
//!   cargo run --release -- --config my.toml      # alternate configuration
//!   cargo run --release -- --series series.json  # load/save series state
//!
//! Environment:
//!   ITRON_PASSWORD - portal password, if not present in the config file
//!   RUST_LOG       - log filter (e.g. itron_sync=debug)

use itron_sync::config::{self, DEFAULT_CONFIG_PATH};
use itron_sync::series::SeriesState;
use itron_sync::sync::SyncEngine;
use std::env;
use std::error::Error;
use std::fs;
use std::path::Path;

fn main() {
    env_logger::init();

    println!("💧 Water Meter Sync");
    println!("===================\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut series_path: Option<String> = None;

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
            "--series" => {
                if i + 1 < args.len() {
                    series_path = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("Error: --series requires a path");
                    std::process::exit(1);
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--config PATH] [--series PATH]", args[0]);
                std::process::exit(1);
            }
        }
    }

    let config = config::load_config(&config_path);
    println!("📋 Configuration:");
    println!("   Municipality: {}", config.municipality);
    println!("   Service point: {}", config.meter_id);
    println!("   Max lookback: {} days\n", config.max_lookback_days);

    let engine = SyncEngine::from_config(&config);

    // Resume from persisted series state, if any
    if let Some(path) = &series_path {
        if Path::new(path).exists() {
            match load_series(path) {
                Ok(series) => {
                    println!("📥 Restored {} readings from {}\n", series.len(), path);
                    if let Err(e) = engine.import_series(series) {
                        eprintln!("❌ Failed to import series state: {}", e);
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("❌ Failed to load {}: {}", path, e);
                    std::process::exit(1);
                }
            }
        }
    }

    println!("🔄 Running sync cycle...");
    let result = match engine.run_cycle() {
        Ok(result) => result,
        Err(e) => {
            eprintln!("\n❌ Sync cycle failed: {}\n", e);
            eprintln!("If this is the first cycle, check the credentials in {}\n", config_path);
            std::process::exit(1);
        }
    };

    println!("✓ Cycle complete\n");
    println!("📊 Series:");
    println!("   Readings: {}", result.series.len());
    if let (Some(first), Some(last)) = (result.series.earliest_date(), result.series.latest_date())
    {
        println!("   Coverage: {} to {}", first, last);
    }
    println!("   Complete ranges: {}", result.series.complete_ranges().len());
    match result.series.backfill_floor() {
        Some(floor) => println!("   History floor: {} (backfill finished)", floor),
        None => println!("   History floor: not yet reached"),
    }

    if result.statistics.has_data() {
        println!("\n📈 Statistics ({} days observed):", result.statistics.observed_days);
        if let Some(peak) = &result.statistics.peak {
            println!("   Peak day:    {} ({:.1} gal)", peak.date, peak.total);
        }
        if let Some(lowest) = &result.statistics.lowest {
            println!("   Lowest day:  {} ({:.1} gal)", lowest.date, lowest.total);
        }
        if let Some(avg) = result.statistics.average_daily {
            println!("   Daily avg:   {:.1} gal", avg);
        }
    } else {
        println!("\n📈 Statistics: no data yet");
    }

    if let Some(meter) = &result.meter {
        println!("\n🔢 Register: meter {} reads {:.2}", meter.meter_number, meter.register_value);
    }

    if !result.errors.is_empty() {
        println!("\n⚠️  {} window(s) failed this cycle:", result.errors.len());
        for failure in &result.errors {
            println!("   {} [{}] {}", failure.window, failure.kind, failure.message);
        }
        println!("   Failed windows are re-planned on the next cycle.");
    }

    if let Some(path) = &series_path {
        match save_series(path, &result.series) {
            Ok(()) => println!("\n💾 Saved series state to {}", path),
            Err(e) => eprintln!("\n❌ Failed to save {}: {}", path, e),
        }
    }
}

fn load_series(path: &str) -> Result<SeriesState, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn save_series(path: &str, series: &SeriesState) -> Result<(), Box<dyn Error>> {
    fs::write(path, serde_json::to_string_pretty(series)?)?;
    Ok(())
}
