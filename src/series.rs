/// The authoritative merged reading series for one meter.
///
/// Merging behaves like an idempotent keyed upsert (the same batch twice
/// changes nothing), with one deliberate exception: the portal is allowed
/// to correct history. An incoming reading at an existing timestamp wins
/// when its value differs, and every such overwrite is counted and logged.
///
/// Persistence is the host platform's job; this type is serde-serializable
/// so the host (or the bundled drivers) can round-trip it as JSON.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{MeterReading, ReadingWindow};

/// Bitmask with one bit per hour of a day; a day is confirmed complete
/// when every hourly slot has a reading.
const FULL_DAY_MASK: u32 = (1 << 24) - 1;

// ---------------------------------------------------------------------------
// Series state
// ---------------------------------------------------------------------------

/// Ordered, deduplicated hourly series plus the gap bookkeeping the
/// backfill planner works from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesState {
    /// Keyed by timestamp, which makes timestamps unique and the
    /// materialized order ascending by construction.
    readings: BTreeMap<NaiveDateTime, MeterReading>,

    /// Maximal runs of consecutive days where all 24 hourly slots are
    /// present. Recomputed after every merge that inserts.
    #[serde(default)]
    complete_ranges: Vec<ReadingWindow>,

    /// Confirmed: the portal has no data on any day before this date.
    /// Set only after an empty backfill chunk is confirmed by a re-fetch.
    #[serde(default)]
    backfill_floor: Option<NaiveDate>,
}

/// What a merge did, for cycle logging and idempotence checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub overwritten: usize,
    pub unchanged: usize,
}

impl SeriesState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// All readings, ascending by timestamp.
    pub fn readings(&self) -> impl Iterator<Item = &MeterReading> {
        self.readings.values()
    }

    pub fn get(&self, timestamp: NaiveDateTime) -> Option<&MeterReading> {
        self.readings.get(&timestamp)
    }

    /// Most recent reading, if any.
    pub fn latest_reading(&self) -> Option<&MeterReading> {
        self.readings.values().next_back()
    }

    /// Date of the earliest known reading.
    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.readings.keys().next().map(|ts| ts.date())
    }

    /// Date of the latest known reading.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.readings.keys().next_back().map(|ts| ts.date())
    }

    /// Confirmed-complete date ranges, ascending and non-adjacent.
    pub fn complete_ranges(&self) -> &[ReadingWindow] {
        &self.complete_ranges
    }

    /// Last day of the most recent confirmed-complete range — the anchor
    /// the incremental fetch resumes from.
    pub fn last_complete_through(&self) -> Option<NaiveDate> {
        self.complete_ranges.last().map(|w| w.end)
    }

    pub fn backfill_floor(&self) -> Option<NaiveDate> {
        self.backfill_floor
    }

    /// Records that the portal confirmed having no data before `floor`.
    /// The floor only ever narrows upward, and never past the earliest
    /// reading actually held.
    pub fn record_no_data_before(&mut self, floor: NaiveDate) {
        let mut floor = floor;
        if let Some(earliest) = self.earliest_date() {
            floor = floor.min(earliest);
        }
        let floor = match self.backfill_floor {
            Some(existing) => existing.max(floor),
            None => floor,
        };
        log::info!("backfill floor confirmed: no portal data before {}", floor);
        self.backfill_floor = Some(floor);
    }

    /// Merges a batch of fetched readings.
    ///
    /// Timestamp collisions keep the incoming reading only when it differs
    /// (portal corrections are expected and logged); identical readings are
    /// counted as unchanged, which makes re-merging a window a no-op.
    pub fn merge(&mut self, new_readings: impl IntoIterator<Item = MeterReading>) -> MergeReport {
        use std::collections::btree_map::Entry;

        let mut report = MergeReport::default();
        for reading in new_readings {
            match self.readings.entry(reading.timestamp) {
                Entry::Vacant(slot) => {
                    slot.insert(reading);
                    report.inserted += 1;
                }
                Entry::Occupied(mut slot) => {
                    if slot.get() == &reading {
                        report.unchanged += 1;
                    } else {
                        log::warn!(
                            "portal corrected reading at {}: {} -> {}",
                            reading.timestamp,
                            slot.get().usage,
                            reading.usage
                        );
                        slot.insert(reading);
                        report.overwritten += 1;
                    }
                }
            }
        }

        if report.inserted > 0 {
            self.recompute_complete_ranges();
        }
        report
    }

    fn recompute_complete_ranges(&mut self) {
        // One bit per present hourly slot, per day.
        let mut day_masks: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        for ts in self.readings.keys() {
            use chrono::Timelike;
            *day_masks.entry(ts.date()).or_default() |= 1 << ts.hour();
        }

        let mut ranges: Vec<ReadingWindow> = Vec::new();
        let mut current: Option<ReadingWindow> = None;

        for (day, mask) in day_masks {
            if mask != FULL_DAY_MASK {
                if let Some(range) = current.take() {
                    ranges.push(range);
                }
                continue;
            }
            current = match current {
                Some(range) if range.end.succ_opt() == Some(day) => {
                    Some(ReadingWindow { start: range.start, end: day })
                }
                Some(range) => {
                    ranges.push(range);
                    Some(ReadingWindow { start: day, end: day })
                }
                None => Some(ReadingWindow { start: day, end: day }),
            };
        }
        if let Some(range) = current {
            ranges.push(range);
        }

        self.complete_ranges = ranges;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
