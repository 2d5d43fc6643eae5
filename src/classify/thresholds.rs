//! Severity threshold checking.
//!
//! Each metric has an ordered table of three inclusive upper bounds. A value
//! at or below the first bound is good, at or below the second moderate, at
//! or below the third unhealthy for sensitive groups, and anything above is
//! unhealthy. Tables are fixed data: registry defaults, optionally replaced
//! per metric by configuration at startup.

use std::collections::HashMap;

use crate::model::{MetricValue, Severity};
use crate::registry::{self, METRIC_REGISTRY};

/// Buckets a numeric value against a three-bound table.
pub fn classify_value(value: f64, bounds: [f64; 3]) -> Severity {
    if value <= bounds[0] {
        Severity::Good
    } else if value <= bounds[1] {
        Severity::Moderate
    } else if value <= bounds[2] {
        Severity::UnhealthyForSensitive
    } else {
        Severity::Unhealthy
    }
}

/// Per-metric threshold tables.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    tables: HashMap<String, [f64; 3]>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::from_registry()
    }
}

impl ThresholdTable {
    /// Tables for every registered metric that defines one.
    pub fn from_registry() -> Self {
        let tables = METRIC_REGISTRY
            .iter()
            .filter_map(|m| m.thresholds.map(|t| (m.name.to_string(), t)))
            .collect();
        Self { tables }
    }

    /// Registry defaults with `overrides` applied on top.
    ///
    /// Overrides are validated by `config::AppConfig::validate`; unknown
    /// metric names are ignored here.
    pub fn with_overrides(overrides: &HashMap<String, [f64; 3]>) -> Self {
        let mut table = Self::from_registry();
        for (metric, bounds) in overrides {
            if registry::find_metric(metric).is_some() {
                table.tables.insert(metric.clone(), *bounds);
            }
        }
        table
    }

    pub fn bounds(&self, metric: &str) -> Option<[f64; 3]> {
        self.tables.get(metric).copied()
    }

    /// Returns the severity tier and its label for `value`.
    ///
    /// Non-numeric and absent values are `Unavailable`, as is any value for
    /// a metric with no table.
    pub fn classify(&self, metric: &str, value: &MetricValue) -> (Severity, &'static str) {
        let severity = match (value.as_f64(), self.bounds(metric)) {
            (Some(v), Some(bounds)) => classify_value(v, bounds),
            _ => Severity::Unavailable,
        };
        (severity, severity.label())
    }
}
