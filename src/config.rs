//! Configuration loader: config.toml, then `.env` and process env overrides.
//!
//! Every field has a default, so the service runs with no config file at
//! all. API keys are only ever taken from the environment or the config
//! file, never compiled in.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::logging::LogLevel;
use crate::model::Domain;
use crate::registry;

pub const ENV_MOENV_API_KEY: &str = "AIRWATCH_MOENV_API_KEY";
pub const ENV_CWA_API_KEY: &str = "AIRWATCH_CWA_API_KEY";
pub const ENV_TTL_SECS: &str = "AIRWATCH_TTL_SECS";
pub const ENV_LOG_LEVEL: &str = "AIRWATCH_LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "AIRWATCH_LOG_FILE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AirQualityConfig {
    /// MOENV station name, also the label shown before the first fetch.
    pub site_name: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

impl Default for AirQualityConfig {
    fn default() -> Self {
        Self {
            site_name: "頭份".to_string(),
            api_key: String::new(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// CWA county dataset id (`F-D0047-013` is Miaoli County, 3-hourly).
    pub dataset: String,
    /// Township name within the dataset.
    pub location: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            dataset: "F-D0047-013".to_string(),
            location: "頭份市".to_string(),
            api_key: String::new(),
            base_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Minimum seconds between refresh attempts per domain.
    pub ttl_secs: u64,
    /// Upper bound on a single provider call.
    pub fetch_timeout_secs: u64,
    /// IANA zone used to read the providers' naive local timestamps.
    pub timezone: String,
    pub log: LogConfig,
    pub air_quality: AirQualityConfig,
    pub forecast: ForecastConfig,
    /// Per-metric threshold overrides, e.g. `aqi = [50, 100, 150]`.
    pub thresholds: HashMap<String, [f64; 3]>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            fetch_timeout_secs: 10,
            timezone: "Asia/Taipei".to_string(),
            log: LogConfig::default(),
            air_quality: AirQualityConfig::default(),
            forecast: ForecastConfig::default(),
            thresholds: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Loads `path` (if given), applies `.env` and process environment
    /// overrides, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                    path: p.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies overrides from `lookup`, which maps an env var name to its
    /// value. Taking a closure keeps tests off the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_MOENV_API_KEY) {
            self.air_quality.api_key = key;
        }
        if let Some(key) = lookup(ENV_CWA_API_KEY) {
            self.forecast.api_key = key;
        }
        if let Some(raw) = lookup(ENV_TTL_SECS) {
            self.ttl_secs = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(vec![format!("{ENV_TTL_SECS} must be a whole number of seconds")])
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level;
        }
        if let Some(file) = lookup(ENV_LOG_FILE) {
            self.log.file = Some(file);
        }
        Ok(())
    }

    /// Collects every problem before failing, so a bad config is fixed in
    /// one pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues: Vec<String> = Vec::new();

        if self.ttl_secs == 0 {
            issues.push("ttl_secs must be > 0".into());
        }
        if self.fetch_timeout_secs == 0 {
            issues.push("fetch_timeout_secs must be > 0".into());
        }
        if self.timezone.parse::<Tz>().is_err() {
            issues.push(format!("timezone '{}' is not a known IANA zone", self.timezone));
        }
        if self.log.level.parse::<LogLevel>().is_err() {
            issues.push(format!("log.level '{}' is not one of debug/info/warn/error", self.log.level));
        }
        if self.air_quality.site_name.trim().is_empty() {
            issues.push("air_quality.site_name must not be empty".into());
        }
        if self.forecast.dataset.trim().is_empty() {
            issues.push("forecast.dataset must not be empty".into());
        }
        if self.forecast.location.trim().is_empty() {
            issues.push("forecast.location must not be empty".into());
        }

        let mut metrics: Vec<&String> = self.thresholds.keys().collect();
        metrics.sort();
        for metric in metrics {
            let [t0, t1, t2] = self.thresholds[metric];
            if registry::find_metric(metric).is_none() {
                issues.push(format!("thresholds.{} is not a known metric", metric));
            } else if !(t0 < t1 && t1 < t2) || [t0, t1, t2].iter().any(|t| !t.is_finite()) {
                issues.push(format!("thresholds.{} must be strictly ascending", metric));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Provider timezone; validated at load time.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::Asia::Taipei)
    }

    pub fn log_level(&self) -> LogLevel {
        self.log.level.parse().unwrap_or(LogLevel::Info)
    }

    /// Label shown for `domain` until a provider reports its own.
    pub fn default_site_label(&self, domain: Domain) -> &str {
        match domain {
            Domain::AirQuality => &self.air_quality.site_name,
            Domain::Forecast => &self.forecast.location,
        }
    }
}
