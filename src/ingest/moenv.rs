/// MOENV (Ministry of Environment, Taiwan) air-quality API client
///
/// Retrieves the hourly monitoring records for one station from the
/// `aqx_p_488` open dataset. The dataset returns several recent hours per
/// station; picking the newest is left to the normalizer.
///
/// API Documentation: https://data.moenv.gov.tw/dataset/detail/AQX_P_488

use std::time::Duration;

use serde_json::Value;

use crate::ingest::{Provider, get_json};
use crate::logging::{self, Source};
use crate::model::{Domain, FetchError, RawPayload};

pub const MOENV_BASE_URL: &str = "https://data.moenv.gov.tw/api/v2";

/// Dataset id for the hourly station monitoring feed.
pub const AQX_DATASET: &str = "aqx_p_488";

/// Air-quality provider backed by the MOENV open-data API.
pub struct MoenvAirQuality {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    site_name: String,
}

impl MoenvAirQuality {
    pub fn new(client: reqwest::blocking::Client, api_key: &str, site_name: &str) -> Self {
        Self {
            client,
            base_url: MOENV_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            site_name: site_name.to_string(),
        }
    }

    /// Points the client at a different host (mirrors, local stubs).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn dataset_url(&self) -> String {
        format!("{}/{}", self.base_url, AQX_DATASET)
    }
}

impl Provider for MoenvAirQuality {
    fn domain(&self) -> Domain {
        Domain::AirQuality
    }

    fn name(&self) -> &str {
        "moenv"
    }

    fn fetch(&self, timeout: Duration) -> Result<RawPayload, FetchError> {
        let filter = format!("SiteName,EQ,{}", self.site_name);
        logging::debug(
            Source::AirQuality,
            Some(&self.site_name),
            &format!("GET {}", self.dataset_url()),
        );

        let request = self.client.get(self.dataset_url()).query(&[
            ("format", "json"),
            ("api_key", self.api_key.as_str()),
            ("filters", filter.as_str()),
        ]);
        let body = get_json(request, timeout)?;
        let records = records_from_body(&body)?;

        logging::debug(
            Source::AirQuality,
            Some(&self.site_name),
            &format!("API returned {} records", records.len()),
        );
        Ok(records)
    }
}

/// Extracts the `records` array, keeping object entries in payload order.
///
/// A body without a `records` array is a shape error; an empty array is
/// returned as-is and rejected later by the normalizer.
pub fn records_from_body(body: &Value) -> Result<RawPayload, FetchError> {
    let records = body
        .get("records")
        .and_then(|r| r.as_array())
        .ok_or_else(|| FetchError::Shape("response has no records array".to_string()))?;

    Ok(records
        .iter()
        .filter_map(|r| r.as_object().cloned())
        .collect())
}
