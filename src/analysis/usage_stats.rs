/// Usage statistics derivation.
///
/// A pure function of the merged series: no portal access, no state, so the
/// host can recompute or cross-check at will. The shapes mirror what the
/// portal's own dashboard derives (highest / lowest / average usage with a
/// weekday-weekend split), computed locally from the hourly series instead
/// of trusted from the portal.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::MeterReading;
use crate::series::SeriesState;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One calendar day's summed usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub total: f64,
}

/// Derived metrics for the host's sensor attributes and automation
/// triggers. `observed_days == 0` is the explicit no-data form: every
/// derived field is `None`, never a zero that could pass for a real
/// measurement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStatistics {
    /// Number of calendar days with at least one reading.
    pub observed_days: usize,
    /// Day with the highest summed usage; ties break to the earliest day.
    pub peak: Option<DailyUsage>,
    /// Day with the lowest summed usage; ties break to the earliest day.
    pub lowest: Option<DailyUsage>,
    pub average_daily: Option<f64>,
    pub weekday_average: Option<f64>,
    pub weekend_average: Option<f64>,
    /// Most recent hourly reading in the series.
    pub latest: Option<MeterReading>,
}

impl UsageStatistics {
    pub fn has_data(&self) -> bool {
        self.observed_days > 0
    }
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

/// Sums hourly readings into per-day totals, ascending by date.
pub fn daily_totals(series: &SeriesState) -> BTreeMap<NaiveDate, f64> {
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for reading in series.readings() {
        *totals.entry(reading.timestamp.date()).or_default() += reading.usage;
    }
    totals
}

/// Derives the full statistics set from the series.
pub fn compute(series: &SeriesState) -> UsageStatistics {
    let totals = daily_totals(series);
    if totals.is_empty() {
        return UsageStatistics::default();
    }

    let mut peak: Option<DailyUsage> = None;
    let mut lowest: Option<DailyUsage> = None;
    let mut sum = 0.0;
    let mut weekday = (0.0, 0usize);
    let mut weekend = (0.0, 0usize);

    // Ascending iteration plus strict comparisons: the earliest day wins
    // ties for both extremes.
    for (&date, &total) in &totals {
        let day = DailyUsage { date, total };
        if peak.is_none_or(|p| total > p.total) {
            peak = Some(day);
        }
        if lowest.is_none_or(|l| total < l.total) {
            lowest = Some(day);
        }
        sum += total;
        match date.weekday() {
            chrono::Weekday::Sat | chrono::Weekday::Sun => {
                weekend.0 += total;
                weekend.1 += 1;
            }
            _ => {
                weekday.0 += total;
                weekday.1 += 1;
            }
        }
    }

    UsageStatistics {
        observed_days: totals.len(),
        peak,
        lowest,
        average_daily: Some(sum / totals.len() as f64),
        weekday_average: (weekday.1 > 0).then(|| weekday.0 / weekday.1 as f64),
        weekend_average: (weekend.1 > 0).then(|| weekend.0 / weekend.1 as f64),
        latest: series.latest_reading().copied(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
