/// Development mode: offline fixture providers
///
/// When the upstream APIs are unreachable (or no API keys are configured),
/// the service can run against canned payloads instead. A fixture file is a
/// JSON object keyed by domain, each holding the flat records a live
/// provider would return:
///
/// ```text
/// {
///   "air_quality": [ { "sitename": "頭份", "aqi": "42", ... } ],
///   "forecast":    [ { "site": "頭份市", "element": "T", "time": "...", "value": "24" } ]
/// }
/// ```

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::ingest::Provider;
use crate::model::{Domain, FetchError, RawPayload, RawRecord};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("cannot read fixture file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk layout of a fixture file. Missing domains serve an empty
/// payload, which the store treats as a failed refresh.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FixtureFile {
    pub air_quality: RawPayload,
    pub forecast: RawPayload,
}

impl FixtureFile {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Splits the file into one provider per domain.
    pub fn into_providers(self) -> (FixtureProvider, FixtureProvider) {
        (
            FixtureProvider::new(Domain::AirQuality, self.air_quality),
            FixtureProvider::new(Domain::Forecast, self.forecast),
        )
    }
}

/// Provider that returns the same payload on every fetch.
#[derive(Debug, Clone)]
pub struct FixtureProvider {
    domain: Domain,
    payload: RawPayload,
}

impl FixtureProvider {
    pub fn new(domain: Domain, payload: RawPayload) -> Self {
        Self { domain, payload }
    }

    /// Built-in sample data for `domain`, timestamped around the current time.
    pub fn sample(domain: Domain) -> Self {
        Self::sample_at(domain, Utc::now())
    }

    /// Built-in sample data with forecast slots laid out from `now`.
    pub fn sample_at(domain: Domain, now: DateTime<Utc>) -> Self {
        let payload = match domain {
            Domain::AirQuality => sample_air_quality(now),
            Domain::Forecast => sample_forecast(now),
        };
        Self::new(domain, payload)
    }

    pub fn payload(&self) -> &RawPayload {
        &self.payload
    }
}

impl Provider for FixtureProvider {
    fn domain(&self) -> Domain {
        self.domain
    }

    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(&self, _timeout: Duration) -> Result<RawPayload, FetchError> {
        Ok(self.payload.clone())
    }
}

// ---------------------------------------------------------------------------
// Built-in samples
// ---------------------------------------------------------------------------

fn as_record(value: Value) -> Option<RawRecord> {
    value.as_object().cloned()
}

fn sample_air_quality(now: DateTime<Utc>) -> RawPayload {
    let published = now.format("%Y-%m-%dT%H:00:00Z").to_string();
    as_record(json!({
        "sitename": "頭份",
        "county": "苗栗縣",
        "aqi": "42",
        "pollutant": "",
        "status": "良好",
        "pm2.5": "11",
        "pm2.5_avg": "9.8",
        "pm10": "25",
        "pm10_avg": "23",
        "o3": "31.4",
        "datacreationdate": published,
    }))
    .into_iter()
    .collect()
}

fn sample_forecast(now: DateTime<Utc>) -> RawPayload {
    // Three 3-hour slots; the first is already in the past.
    let slots: Vec<String> = [-1i64, 2, 5]
        .iter()
        .map(|h| (now + chrono::Duration::hours(*h)).format("%Y-%m-%dT%H:00:00Z").to_string())
        .collect();

    let series: [(&str, [&str; 3]); 6] = [
        ("T", ["24", "26", "23"]),
        ("AT", ["25", "28", "24"]),
        ("CI", ["24", "27", "23"]),
        ("RH", ["78", "70", "82"]),
        ("WS", ["2", "3", " "]),
        ("PoP6h", ["10", "30", "30"]),
    ];

    series
        .iter()
        .flat_map(|(element, values)| {
            slots.iter().zip(values.iter()).filter_map(move |(time, value)| {
                as_record(json!({
                    "site": "頭份市",
                    "element": element,
                    "time": time,
                    "value": value,
                }))
            })
        })
        .collect()
}
