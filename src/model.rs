/// Shared data types for the meter synchronization engine.
///
/// Everything the portal-facing and analysis layers exchange lives here:
/// hourly readings, fetch windows, the error taxonomy surfaced to the host
/// platform, and the per-cycle result envelope. The authoritative series
/// container itself lives in `series.rs`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Unit of the usage values a portal reports. Only water meters (gallons)
/// are supported; anything else the portal advertises is carried through as
/// `Unsupported` so the host can refuse it with a clear message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageUnit {
    Gallon,
    Unsupported,
}

impl fmt::Display for UsageUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageUnit::Gallon => write!(f, "gal"),
            UsageUnit::Unsupported => write!(f, "?"),
        }
    }
}

/// One hourly usage reading from the portal.
///
/// Timestamps are hour-granular and expressed in the municipality's local
/// timezone (the portal reports local wall-clock times). Usage is the delta
/// consumed during that hour, not a cumulative register value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub timestamp: NaiveDateTime,
    pub usage: f64,
    pub unit: UsageUnit,
}

/// The meter's most recent register read from the portal's bundle endpoint:
/// the cumulative dial value (already scaled by the dial count) and when the
/// portal captured it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSnapshot {
    pub meter_number: String,
    pub register_value: f64,
    pub register_read_at: Option<NaiveDateTime>,
}

// ---------------------------------------------------------------------------
// Fetch windows
// ---------------------------------------------------------------------------

/// A contiguous, inclusive date range requested from the portal in one
/// logical fetch. The portal's interval endpoint is day-granular, so a
/// window of N days costs N requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReadingWindow {
    /// Builds a window, swapping the bounds if they arrive reversed.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Number of days covered, inclusive of both endpoints.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Iterates every day in the window, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take(self.num_days().max(0) as usize)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

impl fmt::Display for ReadingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Everything that can go wrong talking to a portal, split by how the
/// orchestrator must react:
/// - `Authentication`: credentials rejected at login. Fatal for the cycle.
/// - `Authorization`: a previously valid session rejected mid-cycle.
///   Recovered once per cycle via invalidate + re-login.
/// - `Transport`: network/timeout/5xx. Retried with bounded backoff, then
///   the window is abandoned until the next cycle.
/// - `Schema`: the response parsed as something other than what this crate
///   reverse-engineered. Never retried in-cycle; usually means the portal
///   changed format.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("credentials rejected by the portal (HTTP {status})")]
    Authentication { status: u16 },

    #[error("session no longer accepted by the portal (HTTP {status})")]
    Authorization { status: u16 },

    #[error("transport failure talking to the portal: {0}")]
    Transport(String),

    #[error("unexpected portal response shape: {0}")]
    Schema(String),
}

impl PortalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PortalError::Authentication { .. } => ErrorKind::Authentication,
            PortalError::Authorization { .. } => ErrorKind::Authorization,
            PortalError::Transport(_) => ErrorKind::Transport,
            PortalError::Schema(_) => ErrorKind::Schema,
        }
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        PortalError::Transport(err.to_string())
    }
}

/// Serializable projection of `PortalError` for the host-facing failure
/// list (the host logs/notifies on these, it does not match on messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Authorization,
    Transport,
    Schema,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authentication => write!(f, "authentication"),
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Schema => write!(f, "schema"),
        }
    }
}

/// Errors the orchestrator itself raises. Per-window failures never take
/// this path; they ride in `SyncResult::errors`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The login handshake failed before any window was fetched. The source
    /// distinguishes credential-rejected from transport from schema causes.
    /// On the very first cycle the host should treat this as a setup
    /// failure requiring user action.
    #[error("portal authentication failed: {0}")]
    Authentication(#[source] PortalError),

    /// `run_cycle` was invoked while a prior cycle for the same meter was
    /// still in flight. Overlapping cycles are rejected, never interleaved.
    #[error("a sync cycle is already in flight for this meter")]
    CycleInProgress,
}

/// A window the cycle could not complete, surfaced to the host for logging
/// and notification. The window is not queued anywhere: the next cycle's
/// plan re-derives it from the series state.
#[derive(Debug, Clone, Serialize)]
pub struct WindowFailure {
    pub window: ReadingWindow,
    pub kind: ErrorKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Cycle result
// ---------------------------------------------------------------------------

/// Hand-off envelope returned by every sync cycle: the merged series for
/// the host to persist, statistics for its sensor attributes, the optional
/// register-read snapshot, and whatever went wrong per window.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub series: crate::series::SeriesState,
    pub statistics: crate::analysis::usage_stats::UsageStatistics,
    pub meter: Option<MeterSnapshot>,
    pub errors: Vec<WindowFailure>,
}
