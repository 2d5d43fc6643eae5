/// Metric registry for the air-quality and forecast domains.
///
/// Defines the canonical list of metrics cached per domain, the provider
/// field each is read from, and its default severity thresholds. This is the
/// single source of truth for metric names; all other modules should
/// reference metrics from here rather than hardcoding names.

use crate::model::Domain;

// ---------------------------------------------------------------------------
// Provider field names
// ---------------------------------------------------------------------------

/// Air-quality record field carrying the provider's data creation time.
pub const AQ_TIMESTAMP_FIELD: &str = "datacreationdate";

/// Air-quality record field carrying the monitoring station name.
pub const AQ_SITE_FIELD: &str = "sitename";

/// Flattened forecast record fields (see `ingest::cwa`).
pub const FORECAST_SITE_FIELD: &str = "site";
pub const FORECAST_ELEMENT_FIELD: &str = "element";
pub const FORECAST_TIME_FIELD: &str = "time";
pub const FORECAST_VALUE_FIELD: &str = "value";

// ---------------------------------------------------------------------------
// Metric metadata
// ---------------------------------------------------------------------------

/// Metadata for a single cached metric.
pub struct MetricDef {
    /// Key used in `Snapshot::readings`.
    pub name: &'static str,
    pub domain: Domain,
    /// Human-readable name for the presentation layer.
    pub display_name: &'static str,
    pub unit: &'static str,
    /// Record field (air quality) or weather element code (forecast).
    pub source_field: &'static str,
    /// Upper bounds of good / moderate / unhealthy-for-sensitive, inclusive.
    /// Must be strictly ascending.
    pub thresholds: Option<[f64; 3]>,
}

/// All cached metrics, air quality first, in display order.
///
/// Sources:
///   - Air quality fields: MOENV `aqx_p_488` dataset
///   - Forecast elements: CWA township forecast `F-D0047-*`
pub static METRIC_REGISTRY: &[MetricDef] = &[
    MetricDef {
        name: "aqi",
        domain: Domain::AirQuality,
        display_name: "空氣品質指標 (AQI)",
        unit: "指數",
        source_field: "aqi",
        thresholds: Some([50.0, 100.0, 150.0]),
    },
    MetricDef {
        name: "pm2.5_avg",
        domain: Domain::AirQuality,
        display_name: "PM2.5 平均",
        unit: "μg/m³",
        source_field: "pm2.5_avg",
        thresholds: Some([15.4, 35.4, 54.4]),
    },
    MetricDef {
        name: "pm10_avg",
        domain: Domain::AirQuality,
        display_name: "PM10 平均",
        unit: "μg/m³",
        source_field: "pm10_avg",
        thresholds: Some([54.0, 125.0, 254.0]),
    },
    MetricDef {
        name: "pm2.5",
        domain: Domain::AirQuality,
        display_name: "PM2.5",
        unit: "μg/m³",
        source_field: "pm2.5",
        thresholds: Some([15.4, 35.4, 54.4]),
    },
    MetricDef {
        name: "pm10",
        domain: Domain::AirQuality,
        display_name: "PM10",
        unit: "μg/m³",
        source_field: "pm10",
        thresholds: Some([54.0, 125.0, 254.0]),
    },
    MetricDef {
        name: "o3",
        domain: Domain::AirQuality,
        display_name: "臭氧 (O₃)",
        unit: "ppb",
        source_field: "o3",
        thresholds: Some([54.0, 70.0, 85.0]),
    },
    MetricDef {
        name: "temperature",
        domain: Domain::Forecast,
        display_name: "溫度",
        unit: "°C",
        source_field: "T",
        thresholds: Some([28.0, 32.0, 35.0]),
    },
    MetricDef {
        name: "feels_like",
        domain: Domain::Forecast,
        display_name: "體感溫度",
        unit: "°C",
        source_field: "AT",
        thresholds: Some([28.0, 32.0, 38.0]),
    },
    MetricDef {
        name: "comfort_index",
        domain: Domain::Forecast,
        display_name: "舒適度指數",
        unit: "",
        source_field: "CI",
        thresholds: Some([26.0, 30.0, 33.0]),
    },
    MetricDef {
        name: "humidity",
        domain: Domain::Forecast,
        display_name: "相對濕度",
        unit: "%",
        source_field: "RH",
        thresholds: Some([60.0, 75.0, 90.0]),
    },
    MetricDef {
        name: "wind",
        domain: Domain::Forecast,
        display_name: "風速",
        unit: "m/s",
        source_field: "WS",
        thresholds: Some([3.3, 7.9, 13.8]),
    },
    MetricDef {
        name: "precipitation_probability",
        domain: Domain::Forecast,
        display_name: "降雨機率",
        unit: "%",
        source_field: "PoP6h",
        thresholds: Some([20.0, 50.0, 80.0]),
    },
];

/// Metrics belonging to `domain`, in registry order.
pub fn metrics_for(domain: Domain) -> impl Iterator<Item = &'static MetricDef> {
    METRIC_REGISTRY.iter().filter(move |m| m.domain == domain)
}

/// Metric names for `domain`, suitable for building placeholder snapshots.
pub fn metric_names(domain: Domain) -> Vec<&'static str> {
    metrics_for(domain).map(|m| m.name).collect()
}

/// Looks up a metric by name. Returns `None` if not found.
pub fn find_metric(name: &str) -> Option<&'static MetricDef> {
    METRIC_REGISTRY.iter().find(|m| m.name == name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
