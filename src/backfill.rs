/// Fetch window planning: the incremental catch-up window plus a bounded
/// backward walk that extends historical coverage chunk by chunk.
///
/// The planner is deliberately stateless: every cycle re-derives its plan
/// from the series state and today's date, so an abandoned window is simply
/// planned again next cycle and an interrupted backfill resumes where the
/// merged data ends. No failure queue, no progress file.
///
/// The backward walk is the rate-limiter against the unofficial portal: at
/// most `max_windows_per_cycle` chunks per cycle, clipped at the confirmed
/// backfill floor and at the configured maximum lookback.

use chrono::{Duration, NaiveDate};

use crate::model::ReadingWindow;
use crate::series::SeriesState;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One cycle's worth of windows. The incremental window is fetched first;
/// backfill chunks follow, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub incremental: ReadingWindow,
    pub backfill: Vec<ReadingWindow>,
}

impl SyncPlan {
    /// Every planned window in fetch order.
    pub fn windows(&self) -> impl Iterator<Item = &ReadingWindow> {
        std::iter::once(&self.incremental).chain(self.backfill.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.backfill.len()
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BackfillPlanner {
    /// Hard bound on how far into the past the engine will ever reach.
    pub max_lookback_days: u32,
    /// Cap on backward chunks per cycle.
    pub max_windows_per_cycle: u32,
    /// Size of one backward chunk.
    pub chunk_days: u32,
    /// How many already-complete trailing days the incremental window
    /// re-fetches. The portal keeps correcting recent days after first
    /// publishing them.
    pub refresh_overlap_days: u32,
}

impl Default for BackfillPlanner {
    fn default() -> Self {
        Self {
            max_lookback_days: 730,
            max_windows_per_cycle: 4,
            chunk_days: 30,
            refresh_overlap_days: 2,
        }
    }
}

impl BackfillPlanner {
    /// Derives this cycle's windows from the series state.
    ///
    /// The incremental window runs from just before the end of the last
    /// confirmed-complete range (see `refresh_overlap_days`) through
    /// `today`; for a series with no complete day yet the latest reading's
    /// date anchors it, and for an empty series it seeds one chunk-sized
    /// window ending today.
    ///
    /// Backward chunks then step from the earliest known coverage toward
    /// the past, stopping at the cap, the backfill floor, or the lookback
    /// bound — whichever comes first.
    pub fn plan(&self, series: &SeriesState, today: NaiveDate) -> SyncPlan {
        let chunk = Duration::days(self.chunk_days.max(1) as i64 - 1);
        let lookback_start = today - Duration::days(self.max_lookback_days as i64);
        let lower_bound = match series.backfill_floor() {
            Some(floor) => floor.max(lookback_start),
            None => lookback_start,
        };

        let anchor = series.last_complete_through().or_else(|| series.latest_date());
        let incremental_start = match anchor {
            Some(d) => d - Duration::days(self.refresh_overlap_days as i64 - 1),
            None => today - chunk,
        }
        .max(lower_bound)
        .min(today);
        let incremental = ReadingWindow::new(incremental_start, today);

        let mut frontier = match series.earliest_date() {
            Some(earliest) => earliest.min(incremental_start),
            None => incremental_start,
        };
        let mut backfill = Vec::new();
        while (backfill.len() as u32) < self.max_windows_per_cycle {
            let Some(end) = frontier.pred_opt() else { break };
            if end < lower_bound {
                break;
            }
            let start = (end - chunk).max(lower_bound);
            backfill.push(ReadingWindow::new(start, end));
            frontier = start;
            if start == lower_bound {
                break;
            }
        }

        SyncPlan { incremental, backfill }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
