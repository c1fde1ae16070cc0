/// itron_sync: hourly water-meter usage synchronization against
/// Itron-hosted municipal analytics portals.
///
/// # Module structure
///
/// ```text
/// itron_sync
/// ├── model          — shared data types (MeterReading, ReadingWindow,
/// │                    SyncResult, …) and the error taxonomy
/// ├── config         — meter.toml loader + credential resolution
/// ├── municipalities — portal profile registry (lcpw, bism); all response
/// │                    parsing is reached through these adapters
/// ├── session        — login handshake, session expiry, invalidation
/// ├── ingest
/// │   ├── portal     — Itron portal API: URL construction + JSON parsing,
/// │   │                windowed ReadingFetcher with bounded retries
/// │   └── fixtures (test only) — representative portal payloads
/// ├── backfill       — window planning: incremental catch-up + bounded
/// │                    backward walk toward the history floor
/// ├── series         — SeriesState: idempotent merge/dedup, confirmed
/// │                    complete ranges, backfill floor
/// ├── analysis
/// │   └── usage_stats — pure usage statistics from the merged series
/// └── sync           — SyncEngine: the run_cycle() orchestrator
/// ```
///
/// The host platform owns scheduling and long-term persistence: it calls
/// `SyncEngine::run_cycle()` on its own cadence, persists the returned
/// series, and feeds it back through `import_series` at startup.

/// Public modules
pub mod analysis;
pub mod backfill;
pub mod config;
pub mod ingest;
pub mod model;
pub mod municipalities;
pub mod series;
pub mod session;
pub mod sync;
