/// Data analysis for the merged meter series.
///
/// Submodules:
/// - `usage_stats` — pure per-day usage statistics (peak/lowest day,
///   averages, weekday/weekend split) derived each cycle.

pub mod usage_stats;
