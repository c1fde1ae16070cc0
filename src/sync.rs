/// Sync cycle orchestration.
///
/// `SyncEngine` owns everything mutable for one meter (session manager and
/// series state) behind a mutex, and `run_cycle` sequences one full pass:
/// ensure session → plan windows → fetch and merge per window → register
/// read snapshot → statistics. The host's scheduler decides when cycles
/// run; overlapping invocations for the same meter are rejected outright
/// rather than queued, so merges stay strictly sequential.
///
/// Failure policy per window: transport and schema failures are recorded
/// and the cycle moves on (the stateless planner re-derives the window next
/// cycle); an authorization rejection gets exactly one invalidate +
/// re-login + retry per cycle; a credential rejection stops further
/// fetching but still hands back the partial result.

use chrono::{NaiveDate, Utc};
use std::sync::Mutex;
use std::time::Duration;

use crate::analysis::usage_stats;
use crate::backfill::BackfillPlanner;
use crate::config::SyncConfig;
use crate::ingest::portal::{FetchSettings, ReadingFetcher};
use crate::model::{
    ErrorKind, MeterReading, MeterSnapshot, PortalError, ReadingWindow, SyncError, SyncResult,
    WindowFailure,
};
use crate::municipalities::{select_municipality, supported_municipality_names, MunicipalityProfile};
use crate::series::SeriesState;
use crate::session::SessionManager;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SyncEngine {
    profile: &'static dyn MunicipalityProfile,
    meter_id: String,
    planner: BackfillPlanner,
    fetcher: ReadingFetcher,
    inner: Mutex<EngineState>,
}

/// The shared mutable resources: exactly one cycle at a time may touch
/// these.
struct EngineState {
    session: SessionManager,
    series: SeriesState,
}

impl SyncEngine {
    /// Builds an engine for one meter.
    ///
    /// # Panics
    /// Panics on setup errors the engine cannot recover from: unknown
    /// municipality, no password in config or environment, or an HTTP
    /// client that fails to build.
    pub fn from_config(config: &SyncConfig) -> Self {
        let profile = select_municipality(&config.municipality).unwrap_or_else(|| {
            panic!(
                "Unknown municipality '{}'. Supported: {}",
                config.municipality,
                supported_municipality_names().join(", ")
            )
        });
        let password = config.resolve_password().unwrap_or_else(|| {
            panic!("No portal password: set `password` in meter.toml or the ITRON_PASSWORD environment variable")
        });
        let root = config
            .portal_override
            .clone()
            .unwrap_or_else(|| profile.portal_root());

        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| panic!("Failed to build HTTP client: {}", e));

        let planner = BackfillPlanner {
            max_lookback_days: config.max_lookback_days,
            max_windows_per_cycle: config.max_backfill_windows_per_cycle,
            chunk_days: config.backfill_chunk_days,
            refresh_overlap_days: config.refresh_overlap_days,
        };
        let fetcher = ReadingFetcher::new(
            client.clone(),
            root.clone(),
            profile,
            FetchSettings {
                transport_retries: config.transport_retries,
                retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            },
        );
        let session = SessionManager::new(
            client,
            root,
            profile,
            config.username.clone(),
            password,
            config.meter_id.clone(),
        );

        Self {
            profile,
            meter_id: config.meter_id.clone(),
            planner,
            fetcher,
            inner: Mutex::new(EngineState { session, series: SeriesState::new() }),
        }
    }

    /// Restores series state the host persisted from an earlier run, so
    /// backfill resumes instead of starting over.
    pub fn import_series(&self, series: SeriesState) -> Result<(), SyncError> {
        let mut state = self.inner.try_lock().map_err(|_| SyncError::CycleInProgress)?;
        state.series = series;
        Ok(())
    }

    /// Runs one sync cycle against the current date in the municipality's
    /// timezone.
    pub fn run_cycle(&self) -> Result<SyncResult, SyncError> {
        let today = Utc::now().with_timezone(&self.profile.timezone()).date_naive();
        self.run_cycle_as_of(today)
    }

    /// Runs one sync cycle treating `today` as the current date. The
    /// drivers and tests use this to pin the plan to a known day.
    pub fn run_cycle_as_of(&self, today: NaiveDate) -> Result<SyncResult, SyncError> {
        let mut state = self.inner.try_lock().map_err(|_| SyncError::CycleInProgress)?;
        let state = &mut *state;

        // Authentication must work before anything is planned; a failure
        // here is the hard setup-failure path.
        state
            .session
            .ensure_session()
            .map_err(SyncError::Authentication)?;

        let plan = self.planner.plan(&state.series, today);
        log::info!(
            "cycle plan for {}: incremental {} + {} backfill chunk(s)",
            self.meter_id,
            plan.incremental,
            plan.backfill.len()
        );

        let mut errors: Vec<WindowFailure> = Vec::new();
        let mut reauth_used = false;
        let mut halt = false;

        // Incremental first: the newest data is what the host is waiting on.
        match self.fetch_window(state, &plan.incremental, &mut reauth_used) {
            Ok(readings) => {
                let report = state.series.merge(readings);
                log::info!(
                    "incremental {}: {} new, {} corrected, {} unchanged",
                    plan.incremental,
                    report.inserted,
                    report.overwritten,
                    report.unchanged
                );
            }
            Err(e) => record_failure(&mut errors, &plan.incremental, e, &mut halt),
        }

        if !halt {
            for window in &plan.backfill {
                match self.fetch_window(state, window, &mut reauth_used) {
                    Ok(readings) if readings.is_empty() => {
                        // Possibly the portal's history floor — but an empty
                        // answer can also be transient, so confirm before
                        // trusting it.
                        match self.fetch_window(state, window, &mut reauth_used) {
                            Ok(confirm) if confirm.is_empty() => {
                                if let Some(floor) = window.end.succ_opt() {
                                    state.series.record_no_data_before(floor);
                                }
                                break;
                            }
                            Ok(confirm) => {
                                state.series.merge(confirm);
                            }
                            Err(e) => record_failure(&mut errors, window, e, &mut halt),
                        }
                    }
                    Ok(readings) => {
                        let report = state.series.merge(readings);
                        log::info!(
                            "backfill {}: {} new, {} corrected",
                            window,
                            report.inserted,
                            report.overwritten
                        );
                    }
                    Err(e) => record_failure(&mut errors, window, e, &mut halt),
                }
                if halt {
                    break;
                }
            }
        }

        let statistics = usage_stats::compute(&state.series);
        let meter = if halt { None } else { self.fetch_snapshot(state, today) };

        Ok(SyncResult { series: state.series.clone(), statistics, meter, errors })
    }

    /// Fetches one window, recovering from a rejected session at most once
    /// per cycle: invalidate, re-login, retry the window. A second
    /// authorization failure in the same cycle surfaces as-is.
    fn fetch_window(
        &self,
        state: &mut EngineState,
        window: &ReadingWindow,
        reauth_used: &mut bool,
    ) -> Result<Vec<MeterReading>, PortalError> {
        let session = state.session.ensure_session()?;
        match self.fetcher.fetch(window, session, &self.meter_id) {
            Err(PortalError::Authorization { status }) if !*reauth_used => {
                *reauth_used = true;
                log::info!(
                    "portal rejected the session (HTTP {}), re-authenticating once",
                    status
                );
                state.session.invalidate();
                let session = state.session.ensure_session()?;
                self.fetcher.fetch(window, session, &self.meter_id)
            }
            other => other,
        }
    }

    /// Register-read snapshot from the bundle endpoint. The hourly series
    /// is the primary product; snapshot failures only cost the attribute.
    fn fetch_snapshot(&self, state: &mut EngineState, today: NaiveDate) -> Option<MeterSnapshot> {
        let session = match state.session.ensure_session() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("skipping register read snapshot: {}", e);
                return None;
            }
        };
        let meter_number = session
            .service_point()
            .meter_number
            .clone()
            .unwrap_or_else(|| self.meter_id.clone());
        let as_of = today.and_hms_opt(23, 59, 59).unwrap_or_default();

        match self
            .fetcher
            .fetch_snapshot(session, &self.meter_id, &meter_number, as_of)
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("register read snapshot failed: {}", e);
                None
            }
        }
    }
}

fn record_failure(
    errors: &mut Vec<WindowFailure>,
    window: &ReadingWindow,
    error: PortalError,
    halt: &mut bool,
) {
    let kind = error.kind();
    log::warn!("window {} failed ({}): {}", window, kind, error);
    errors.push(WindowFailure { window: *window, kind, message: error.to_string() });
    if kind == ErrorKind::Authentication {
        // Credentials are gone; every further request would fail the same
        // way. Hand back what this cycle already merged.
        *halt = true;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
