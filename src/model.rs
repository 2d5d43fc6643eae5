/// Core data types for the air-quality / forecast snapshot service.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no logic beyond small accessors and formatting, and no I/O.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

/// One of the two independently cached data categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    AirQuality,
    Forecast,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::AirQuality, Domain::Forecast];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::AirQuality => "air_quality",
            Domain::Forecast => "forecast",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Raw provider payloads
// ---------------------------------------------------------------------------

/// One provider record: field name to string/number, shape otherwise opaque.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Ordered sequence of records as returned by a provider client.
pub type RawPayload = Vec<RawRecord>;

// ---------------------------------------------------------------------------
// Metric values
// ---------------------------------------------------------------------------

/// A metric value as extracted from a provider payload.
///
/// Providers are loosely typed: a field may be missing, present with a number,
/// or present with text such as `"ND"` or `"<= 1"`. All three are kept apart
/// so the classifier and trend calculator never have to guess.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Numeric(f64),
    NonNumeric(String),
    Absent,
}

impl MetricValue {
    /// The numeric value, if there is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Numeric(v) => write!(f, "{}", v),
            MetricValue::NonNumeric(s) => write!(f, "{}", s),
            MetricValue::Absent => write!(f, "N/A"),
        }
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Health/impact bucket derived from a metric value, in ascending order of
/// severity. `Unavailable` sorts last but is not "worse" than `Unhealthy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
    Unavailable,
}

impl Severity {
    /// Localized label shown next to a reading.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Good => "良好",
            Severity::Moderate => "普通",
            Severity::UnhealthyForSensitive => "對敏感族群不健康",
            Severity::Unhealthy => "不健康",
            Severity::Unavailable => "無資料",
        }
    }

    /// Colour class used by the presentation layer's card styles.
    pub fn color_class(&self) -> &'static str {
        match self {
            Severity::Good => "green",
            Severity::Moderate => "yellow",
            Severity::UnhealthyForSensitive => "orange",
            Severity::Unhealthy => "red",
            Severity::Unavailable => "gray",
        }
    }
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Unchanged,
}

/// Signed change of a metric against the previously cached value.
/// `delta` is already rounded to one decimal place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub delta: f64,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            TrendDirection::Up => write!(f, "up +{:.1}", self.delta),
            TrendDirection::Down => write!(f, "down {:.1}", self.delta),
            TrendDirection::Unchanged => write!(f, "unchanged"),
        }
    }
}

// ---------------------------------------------------------------------------
// Readings and snapshots
// ---------------------------------------------------------------------------

/// One observed or forecast quantity, classified and (maybe) trended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReading {
    pub value: MetricValue,
    pub severity: Severity,
    pub label: &'static str,
    /// Presentation colour class bound to `severity`.
    pub color: &'static str,
    pub trend: Option<Trend>,
}

impl MetricReading {
    pub fn new(value: MetricValue, severity: Severity, trend: Option<Trend>) -> Self {
        Self {
            value,
            severity,
            label: severity.label(),
            color: severity.color_class(),
            trend,
        }
    }

    /// Placeholder used before the first successful fetch.
    pub fn unavailable() -> Self {
        Self::new(MetricValue::Absent, Severity::Unavailable, None)
    }
}

/// How a snapshot should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    /// Latest refresh attempt succeeded.
    Fresh,
    /// Latest attempt failed; readings are from an earlier success.
    Stale,
    /// No refresh has ever succeeded.
    NeverFetched,
}

/// An immutable bundle of classified readings for one domain.
///
/// Snapshots are published whole and never mutated afterwards; a refresh
/// builds a new one and swaps it in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub domain: Domain,
    pub readings: BTreeMap<String, MetricReading>,
    pub site_label: String,
    /// Publish/observation time assigned by the provider, verbatim.
    pub source_timestamp: Option<String>,
    /// Local time the last successful refresh completed.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Outcome of the most recent refresh attempt only.
    pub valid: bool,
}

impl Snapshot {
    /// Placeholder snapshot with every metric key present and unavailable.
    pub fn placeholder<'a>(
        domain: Domain,
        metric_names: impl IntoIterator<Item = &'a str>,
        site_label: &str,
    ) -> Self {
        let readings = metric_names
            .into_iter()
            .map(|name| (name.to_string(), MetricReading::unavailable()))
            .collect();
        Self {
            domain,
            readings,
            site_label: site_label.to_string(),
            source_timestamp: None,
            fetched_at: None,
            valid: false,
        }
    }

    pub fn status(&self) -> SnapshotStatus {
        match (self.valid, self.fetched_at) {
            (true, _) => SnapshotStatus::Fresh,
            (false, Some(_)) => SnapshotStatus::Stale,
            (false, None) => SnapshotStatus::NeverFetched,
        }
    }

    pub fn reading(&self, metric: &str) -> Option<&MetricReading> {
        self.readings.get(metric)
    }

    /// Copy of this snapshot marked as coming from a failed attempt.
    pub fn degraded(&self) -> Self {
        Self {
            valid: false,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or normalizing provider data.
///
/// `Timeout`, `Transport` and `HttpStatus` are transport failures; `Shape`
/// covers well-formed responses missing the expected records; `Parse` covers
/// bodies that could not be decoded at all.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    #[error("Unexpected payload shape: {0}")]
    Shape(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Provider panicked: {0}")]
    Panic(String),
}
