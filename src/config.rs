/// Sync configuration loader - parses meter.toml
///
/// Separates account and tuning parameters from code. The password may be
/// left out of the file and supplied through the `ITRON_PASSWORD`
/// environment variable instead (a `.env` file works too), so credentials
/// never have to live next to the tuning knobs.

use serde::Deserialize;
use std::env;
use std::fs;

use crate::municipalities::{select_municipality, supported_municipality_names};

/// Expected configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "meter.toml";

/// Everything the host hands the engine for one meter.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Municipality name or short code from the registry (e.g. "lcpw").
    pub municipality: String,

    /// Portal login name.
    pub username: String,

    /// Portal password; falls back to the ITRON_PASSWORD environment
    /// variable when absent.
    #[serde(default)]
    pub password: Option<String>,

    /// Service point identifier of the water meter to sync.
    pub meter_id: String,

    /// Hard bound on how far back history is ever requested.
    #[serde(default = "default_max_lookback_days")]
    pub max_lookback_days: u32,

    /// Backward backfill chunks per cycle; the request-storm guard.
    #[serde(default = "default_max_backfill_windows")]
    pub max_backfill_windows_per_cycle: u32,

    /// Days per backward backfill chunk.
    #[serde(default = "default_backfill_chunk_days")]
    pub backfill_chunk_days: u32,

    /// Trailing complete days the incremental fetch re-requests each cycle
    /// to pick up portal corrections.
    #[serde(default = "default_refresh_overlap_days")]
    pub refresh_overlap_days: u32,

    /// Transport-failure retries per request.
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,

    /// Base backoff between transport retries, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Full portal root URL override (scheme included). Points the engine
    /// at a staging or mock host instead of the municipality's production
    /// portal; the parsing profile stays the municipality's.
    #[serde(default)]
    pub portal_override: Option<String>,
}

fn default_max_lookback_days() -> u32 {
    730
}

fn default_max_backfill_windows() -> u32 {
    4
}

fn default_backfill_chunk_days() -> u32 {
    30
}

fn default_refresh_overlap_days() -> u32 {
    2
}

fn default_transport_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl SyncConfig {
    /// The configured password, or the `ITRON_PASSWORD` environment
    /// variable (a `.env` file in the working directory is honored).
    pub fn resolve_password(&self) -> Option<String> {
        self.password.clone().or_else(|| {
            dotenv::dotenv().ok();
            env::var("ITRON_PASSWORD").ok()
        })
    }
}

/// Parses configuration from TOML text.
///
/// # Panics
/// Panics on malformed TOML or an unknown municipality. This is
/// intentional — the engine cannot operate without a valid configuration,
/// and a bad one is a setup failure the user has to fix, not something to
/// limp past.
pub fn parse_config(contents: &str) -> SyncConfig {
    let config: SyncConfig =
        toml::from_str(contents).unwrap_or_else(|e| panic!("Failed to parse configuration: {}", e));

    if select_municipality(&config.municipality).is_none() {
        panic!(
            "Unknown municipality '{}'. Supported: {}",
            config.municipality,
            supported_municipality_names().join(", ")
        );
    }
    if config.meter_id.trim().is_empty() {
        panic!("meter_id must not be empty");
    }

    config
}

/// Loads configuration from a file.
///
/// # Panics
/// Panics if the file is missing or invalid, as `parse_config` does.
pub fn load_config(path: &str) -> SyncConfig {
    let contents =
        fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e));
    parse_config(&contents)
}
