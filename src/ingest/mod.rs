/// Upstream provider clients.
///
/// Each provider issues one blocking HTTP call per refresh and hands back a
/// flat `RawPayload`. No retries happen at this layer: a failed fetch waits
/// for the next TTL window.
///
/// Submodules:
/// - `moenv` — MOENV air-quality monitoring feed (`aqx_p_488`).
/// - `cwa` — CWA township weather forecast (`F-D0047-*`).

pub mod cwa;
pub mod moenv;

use std::time::Duration;

use crate::model::{Domain, FetchError, RawPayload};

/// Contract between the refresh coordinator and an upstream data source.
pub trait Provider: Send + Sync {
    /// Domain whose cache entry this provider refreshes.
    fn domain(&self) -> Domain;

    /// Short identifier used in logs and verification reports.
    fn name(&self) -> &str;

    /// Fetches the current payload, giving up after `timeout`.
    fn fetch(&self, timeout: Duration) -> Result<RawPayload, FetchError>;
}

/// Builds the blocking HTTP client shared by the provider implementations.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::blocking::Client, FetchError> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("airwatch_service/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))
}

/// Maps a reqwest error onto the fetch error taxonomy.
pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout.as_secs())
    } else if let Some(status) = err.status() {
        FetchError::HttpStatus(status.as_u16())
    } else if err.is_decode() {
        FetchError::Parse(err.to_string())
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// Sends `request` and decodes a JSON body, rejecting non-2xx statuses.
pub(crate) fn get_json(
    request: reqwest::blocking::RequestBuilder,
    timeout: Duration,
) -> Result<serde_json::Value, FetchError> {
    let response = request
        .header("Accept", "application/json")
        .timeout(timeout)
        .send()
        .map_err(|e| map_reqwest_error(e, timeout))?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    response
        .json::<serde_json::Value>()
        .map_err(|e| map_reqwest_error(e, timeout))
}
