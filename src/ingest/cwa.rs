/// CWA (Central Weather Administration, Taiwan) forecast API client
///
/// Retrieves the township-level forecast for one locality from the
/// `F-D0047-*` datasets and flattens the nested element/time structure into
/// one record per (weather element, time slot):
///
/// ```text
/// { "site": "頭份市", "element": "T", "time": "2024-01-01 12:00:00", "value": "21" }
/// ```
///
/// Point-in-time elements (T, AT, CI, RH, WS) carry `dataTime`; interval
/// elements (PoP6h) carry `startTime`, which is used as the slot time.
///
/// API Documentation: https://opendata.cwa.gov.tw/dist/opendata-swagger.html

use std::time::Duration;

use serde_json::{Map, Value};

use crate::ingest::{Provider, get_json};
use crate::logging::{self, Source};
use crate::model::{Domain, FetchError, RawPayload, RawRecord};
use crate::registry::{
    self, FORECAST_ELEMENT_FIELD, FORECAST_SITE_FIELD, FORECAST_TIME_FIELD, FORECAST_VALUE_FIELD,
};

pub const CWA_BASE_URL: &str = "https://opendata.cwa.gov.tw/api/v1/rest/datastore";

/// Forecast provider backed by the CWA open-data API.
pub struct CwaForecast {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    dataset: String,
    location: String,
}

impl CwaForecast {
    /// `dataset` is the county dataset id, e.g. `F-D0047-013` for Miaoli.
    pub fn new(
        client: reqwest::blocking::Client,
        api_key: &str,
        dataset: &str,
        location: &str,
    ) -> Self {
        Self {
            client,
            base_url: CWA_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            dataset: dataset.to_string(),
            location: location.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn dataset_url(&self) -> String {
        format!("{}/{}", self.base_url, self.dataset)
    }

    /// Comma-separated element codes for every registered forecast metric.
    fn element_names() -> String {
        registry::metrics_for(Domain::Forecast)
            .map(|m| m.source_field)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Provider for CwaForecast {
    fn domain(&self) -> Domain {
        Domain::Forecast
    }

    fn name(&self) -> &str {
        "cwa"
    }

    fn fetch(&self, timeout: Duration) -> Result<RawPayload, FetchError> {
        logging::debug(
            Source::Forecast,
            Some(&self.location),
            &format!("GET {}", self.dataset_url()),
        );

        let elements = Self::element_names();
        let request = self.client.get(self.dataset_url()).query(&[
            ("Authorization", self.api_key.as_str()),
            ("format", "JSON"),
            ("locationName", self.location.as_str()),
            ("elementName", elements.as_str()),
        ]);
        let body = get_json(request, timeout)?;
        let records = flatten_forecast(&body, &self.location)?;

        logging::debug(
            Source::Forecast,
            Some(&self.location),
            &format!("API returned {} element slots", records.len()),
        );
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

/// Flattens `records.locations[].location[]` for `location_name` into slot
/// records. A response without that township is a shape error; another
/// township's forecast is never substituted.
pub fn flatten_forecast(body: &Value, location_name: &str) -> Result<RawPayload, FetchError> {
    let locations: Vec<&Value> = body
        .pointer("/records/locations")
        .and_then(|l| l.as_array())
        .ok_or_else(|| FetchError::Shape("response has no records.locations array".to_string()))?
        .iter()
        .filter_map(|group| group.get("location").and_then(|l| l.as_array()))
        .flatten()
        .collect();

    let location = locations
        .iter()
        .find(|l| l.get("locationName").and_then(|n| n.as_str()) == Some(location_name))
        .ok_or_else(|| FetchError::Shape(format!("no forecast location for {}", location_name)))?;

    let elements = location
        .get("weatherElement")
        .and_then(|w| w.as_array())
        .ok_or_else(|| FetchError::Shape(format!("location {} has no weatherElement", location_name)))?;

    let mut records = Vec::new();
    for element in elements {
        let Some(code) = element.get("elementName").and_then(|n| n.as_str()) else {
            continue;
        };
        let slots = element
            .get("time")
            .and_then(|t| t.as_array())
            .map(|t| t.as_slice())
            .unwrap_or_default();
        for slot in slots {
            records.push(slot_record(location_name, code, slot));
        }
    }
    Ok(records)
}

fn slot_record(site: &str, element: &str, slot: &Value) -> RawRecord {
    let time = slot
        .get("dataTime")
        .or_else(|| slot.get("startTime"))
        .cloned()
        .unwrap_or(Value::Null);
    let value = slot
        .pointer("/elementValue/0/value")
        .cloned()
        .unwrap_or(Value::Null);

    let mut record = Map::new();
    record.insert(FORECAST_SITE_FIELD.to_string(), Value::String(site.to_string()));
    record.insert(FORECAST_ELEMENT_FIELD.to_string(), Value::String(element.to_string()));
    record.insert(FORECAST_TIME_FIELD.to_string(), time);
    record.insert(FORECAST_VALUE_FIELD.to_string(), value);
    record
}
