//! Trend calculation against the previously cached value.
//!
//! The previous value always comes from the snapshot being replaced, captured
//! by the refresh coordinator before the new snapshot is built.

use crate::model::{MetricValue, Trend, TrendDirection};

/// Rounds to one decimal place.
fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Signed change from `previous` to `current`.
///
/// Returns `None` if there is no previous value or either side is not
/// numeric. Direction follows the rounded delta, so changes smaller than
/// 0.05 report as unchanged.
pub fn delta(current: &MetricValue, previous: Option<&MetricValue>) -> Option<Trend> {
    let current = current.as_f64()?;
    let previous = previous?.as_f64()?;
    let rounded = round1(current - previous);

    let trend = if rounded > 0.0 {
        Trend { direction: TrendDirection::Up, delta: rounded }
    } else if rounded < 0.0 {
        Trend { direction: TrendDirection::Down, delta: rounded }
    } else {
        Trend { direction: TrendDirection::Unchanged, delta: 0.0 }
    };
    Some(trend)
}
