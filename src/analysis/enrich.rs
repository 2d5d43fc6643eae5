//! Builds a publishable snapshot from normalized values.
//!
//! Classification and trend are applied per metric. The outgoing snapshot
//! is only read, never modified.

use chrono::{DateTime, Utc};

use crate::analysis::normalize::NormalizedReading;
use crate::analysis::trend;
use crate::classify::ThresholdTable;
use crate::model::{Domain, MetricReading, MetricValue, Snapshot};
use crate::registry;

/// Assembles the successor of `previous` from a fresh normalized reading.
///
/// The key set always comes from the registry, so a provider that drops a
/// field yields an unavailable reading rather than a missing key.
pub fn build_snapshot(
    domain: Domain,
    normalized: NormalizedReading,
    previous: &Snapshot,
    thresholds: &ThresholdTable,
    default_site_label: &str,
    fetched_at: DateTime<Utc>,
) -> Snapshot {
    let readings = registry::metrics_for(domain)
        .map(|metric| {
            let value = normalized
                .values
                .get(metric.name)
                .cloned()
                .unwrap_or(MetricValue::Absent);
            let (severity, _) = thresholds.classify(metric.name, &value);
            let previous_value = previous.readings.get(metric.name).map(|r| &r.value);
            let trend = trend::delta(&value, previous_value);
            (metric.name.to_string(), MetricReading::new(value, severity, trend))
        })
        .collect();

    Snapshot {
        domain,
        readings,
        site_label: normalized
            .site_label
            .unwrap_or_else(|| default_site_label.to_string()),
        source_timestamp: normalized.source_timestamp,
        fetched_at: Some(fetched_at),
        valid: true,
    }
}
