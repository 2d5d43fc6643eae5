/// Metric classification.
///
/// Submodules:
/// - `thresholds` — per-metric threshold tables and the tier bucketing rule.

pub mod thresholds;

pub use thresholds::{ThresholdTable, classify_value};
