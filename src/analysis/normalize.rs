/// Reading normalization.
///
/// Turns a raw provider payload into one canonical set of metric values per
/// domain. Extraction never fails on an individual field: a missing field is
/// `Absent`, a field that is not a number is `NonNumeric`. Only a payload
/// with no usable record at all is an error.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::model::{Domain, FetchError, MetricValue, RawPayload, RawRecord};
use crate::registry::{
    self, AQ_SITE_FIELD, AQ_TIMESTAMP_FIELD, FORECAST_ELEMENT_FIELD, FORECAST_SITE_FIELD,
    FORECAST_TIME_FIELD, FORECAST_VALUE_FIELD,
};

/// Naive layouts the providers use for local timestamps.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Canonical values for one domain, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    /// One entry per registered metric of the domain.
    pub values: BTreeMap<String, MetricValue>,
    pub site_label: Option<String>,
    pub source_timestamp: Option<String>,
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// Extracts `field` from `record` as a tri-state metric value.
pub fn extract_value(record: &RawRecord, field: &str) -> MetricValue {
    match record.get(field) {
        None | Some(Value::Null) => MetricValue::Absent,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() => MetricValue::Numeric(v),
            _ => MetricValue::NonNumeric(n.to_string()),
        },
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return MetricValue::Absent;
            }
            match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => MetricValue::Numeric(v),
                _ => MetricValue::NonNumeric(trimmed.to_string()),
            }
        }
        Some(other) => MetricValue::NonNumeric(other.to_string()),
    }
}

/// Non-empty text content of `field`, with numbers rendered as text.
pub fn extract_text(record: &RawRecord, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses a provider timestamp: RFC 3339 first, then the naive layouts
/// interpreted in the provider's timezone.
pub fn parse_provider_timestamp(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(raw, fmt).ok()?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

// ---------------------------------------------------------------------------
// Record selection
// ---------------------------------------------------------------------------

/// Selects the record with the greatest `timestamp_field`.
///
/// Timestamps are compared as strings, which orders the providers'
/// zero-padded `YYYY-MM-DD HH:MM` layout chronologically. Ties keep the
/// earliest record in payload order. If no record carries a timestamp the
/// first record is returned.
pub fn select_latest_record<'a>(
    records: &'a [RawRecord],
    timestamp_field: &str,
) -> Option<&'a RawRecord> {
    let mut best: Option<(&'a RawRecord, String)> = None;
    for record in records {
        let Some(ts) = extract_text(record, timestamp_field) else {
            continue;
        };
        match &best {
            Some((_, best_ts)) if ts <= *best_ts => {}
            _ => best = Some((record, ts)),
        }
    }
    best.map(|(record, _)| record).or_else(|| records.first())
}

/// Index of the slot with the smallest time not earlier than `now`,
/// falling back to the first slot. Slots whose time does not parse are
/// never selected by time.
pub fn select_forecast_slot(slot_times: &[Option<DateTime<Utc>>], now: DateTime<Utc>) -> usize {
    slot_times
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.filter(|t| *t >= now).map(|t| (i, t)))
        .min_by_key(|(_, t)| *t)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Per-domain normalization
// ---------------------------------------------------------------------------

/// Normalizes an air-quality payload (one record per publish hour).
pub fn normalize_air_quality(payload: &RawPayload) -> Result<NormalizedReading, FetchError> {
    let record = select_latest_record(payload, AQ_TIMESTAMP_FIELD)
        .ok_or_else(|| FetchError::Shape("no air-quality records in response".to_string()))?;

    let values = registry::metrics_for(Domain::AirQuality)
        .map(|m| (m.name.to_string(), extract_value(record, m.source_field)))
        .collect();

    Ok(NormalizedReading {
        values,
        site_label: extract_text(record, AQ_SITE_FIELD),
        source_timestamp: extract_text(record, AQ_TIMESTAMP_FIELD),
    })
}

/// Normalizes a flattened forecast payload (one record per element slot).
///
/// Each weather element picks its own slot, so elements published on
/// different cadences (hourly temperature, 6-hourly rain probability) each
/// report the slot nearest to `now`.
pub fn normalize_forecast(
    payload: &RawPayload,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<NormalizedReading, FetchError> {
    let mut values = BTreeMap::new();
    let mut slot_times: BTreeMap<&'static str, String> = BTreeMap::new();
    let mut matched_any = false;

    for metric in registry::metrics_for(Domain::Forecast) {
        let slots: Vec<&RawRecord> = payload
            .iter()
            .filter(|r| extract_text(r, FORECAST_ELEMENT_FIELD).as_deref() == Some(metric.source_field))
            .collect();

        if slots.is_empty() {
            values.insert(metric.name.to_string(), MetricValue::Absent);
            continue;
        }
        matched_any = true;

        let times: Vec<Option<DateTime<Utc>>> = slots
            .iter()
            .map(|r| extract_text(r, FORECAST_TIME_FIELD).and_then(|t| parse_provider_timestamp(&t, tz)))
            .collect();
        let slot = slots[select_forecast_slot(&times, now)];

        values.insert(metric.name.to_string(), extract_value(slot, FORECAST_VALUE_FIELD));
        if let Some(time) = extract_text(slot, FORECAST_TIME_FIELD) {
            slot_times.insert(metric.name, time);
        }
    }

    if !matched_any {
        return Err(FetchError::Shape(
            "no known weather elements in forecast response".to_string(),
        ));
    }

    let source_timestamp = slot_times.get("temperature").cloned().or_else(|| {
        registry::metrics_for(Domain::Forecast).find_map(|m| slot_times.get(m.name).cloned())
    });

    Ok(NormalizedReading {
        values,
        site_label: payload.iter().find_map(|r| extract_text(r, FORECAST_SITE_FIELD)),
        source_timestamp,
    })
}

/// Dispatches to the domain's normalizer.
pub fn normalize(
    domain: Domain,
    payload: &RawPayload,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<NormalizedReading, FetchError> {
    match domain {
        Domain::AirQuality => normalize_air_quality(payload),
        Domain::Forecast => normalize_forecast(payload, now, tz),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().expect("test record must be an object")
    }

    fn taipei() -> Tz {
        chrono_tz::Asia::Taipei
    }

    // --- Field extraction ---------------------------------------------------

    #[test]
    fn test_extract_value_tri_state() {
        let r = record(json!({
            "aqi": "42",
            "pm10": 17.5,
            "o3": "ND",
            "pm2.5": "",
            "pm10_avg": null,
        }));
        assert_eq!(extract_value(&r, "aqi"), MetricValue::Numeric(42.0));
        assert_eq!(extract_value(&r, "pm10"), MetricValue::Numeric(17.5));
        assert_eq!(extract_value(&r, "o3"), MetricValue::NonNumeric("ND".into()));
        assert_eq!(extract_value(&r, "pm2.5"), MetricValue::Absent);
        assert_eq!(extract_value(&r, "pm10_avg"), MetricValue::Absent);
        assert_eq!(extract_value(&r, "missing"), MetricValue::Absent);
    }

    #[test]
    fn test_extract_value_rejects_non_finite_text() {
        let r = record(json!({ "aqi": "NaN", "o3": "inf" }));
        assert_eq!(extract_value(&r, "aqi"), MetricValue::NonNumeric("NaN".into()));
        assert_eq!(extract_value(&r, "o3"), MetricValue::NonNumeric("inf".into()));
    }

    // --- Record selection ---------------------------------------------------

    #[test]
    fn test_select_latest_record_picks_greatest_timestamp() {
        let records = vec![
            record(json!({ "datacreationdate": "2024-01-01 09:00", "aqi": "1" })),
            record(json!({ "datacreationdate": "2024-01-01 10:00", "aqi": "2" })),
            record(json!({ "datacreationdate": "2024-01-01 08:00", "aqi": "3" })),
        ];
        let chosen = select_latest_record(&records, AQ_TIMESTAMP_FIELD).expect("non-empty");
        assert_eq!(
            extract_text(chosen, AQ_TIMESTAMP_FIELD).as_deref(),
            Some("2024-01-01 10:00")
        );
    }

    #[test]
    fn test_select_latest_record_falls_back_to_first_without_timestamps() {
        let records = vec![
            record(json!({ "aqi": "first" })),
            record(json!({ "aqi": "second", "datacreationdate": "" })),
        ];
        let chosen = select_latest_record(&records, AQ_TIMESTAMP_FIELD).expect("non-empty");
        assert_eq!(extract_text(chosen, "aqi").as_deref(), Some("first"));
    }

    #[test]
    fn test_select_latest_record_ignores_untimestamped_when_others_have_one() {
        let records = vec![
            record(json!({ "aqi": "no-ts" })),
            record(json!({ "aqi": "ts", "datacreationdate": "2024-01-01 08:00" })),
        ];
        let chosen = select_latest_record(&records, AQ_TIMESTAMP_FIELD).expect("non-empty");
        assert_eq!(extract_text(chosen, "aqi").as_deref(), Some("ts"));
    }

    #[test]
    fn test_select_latest_record_tie_keeps_payload_order() {
        let records = vec![
            record(json!({ "aqi": "a", "datacreationdate": "2024-01-01 10:00" })),
            record(json!({ "aqi": "b", "datacreationdate": "2024-01-01 10:00" })),
        ];
        let chosen = select_latest_record(&records, AQ_TIMESTAMP_FIELD).expect("non-empty");
        assert_eq!(extract_text(chosen, "aqi").as_deref(), Some("a"));
    }

    #[test]
    fn test_select_latest_record_empty_payload() {
        assert!(select_latest_record(&[], AQ_TIMESTAMP_FIELD).is_none());
    }

    #[test]
    fn test_select_forecast_slot_nearest_upcoming() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let times = vec![
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap()),
        ];
        assert_eq!(select_forecast_slot(&times, now), 2);
    }

    #[test]
    fn test_select_forecast_slot_exact_match_counts_as_current() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let times = vec![
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
            Some(now),
        ];
        assert_eq!(select_forecast_slot(&times, now), 1);
    }

    #[test]
    fn test_select_forecast_slot_falls_back_to_first() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let times = vec![
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
            None,
        ];
        assert_eq!(select_forecast_slot(&times, now), 0);
        assert_eq!(select_forecast_slot(&[], now), 0);
    }

    // --- Timestamps ---------------------------------------------------------

    #[test]
    fn test_parse_provider_timestamp_local_and_rfc3339_agree() {
        let local = parse_provider_timestamp("2024-01-01 08:00:00", taipei()).expect("naive");
        let rfc = parse_provider_timestamp("2024-01-01T08:00:00+08:00", taipei()).expect("rfc3339");
        assert_eq!(local, rfc);
        assert_eq!(local, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_provider_timestamp_rejects_garbage() {
        assert!(parse_provider_timestamp("not-a-datetime", taipei()).is_none());
        assert!(parse_provider_timestamp("", taipei()).is_none());
    }

    // --- Air quality --------------------------------------------------------

    #[test]
    fn test_normalize_air_quality_extracts_all_metrics() {
        let payload = vec![record(json!({
            "sitename": "頭份",
            "datacreationdate": "2024-01-01 10:00",
            "aqi": "61",
            "pm2.5": "18",
            "pm2.5_avg": "20.3",
            "pm10": "40",
            "pm10_avg": "38",
            "o3": "",
        }))];
        let normalized = normalize_air_quality(&payload).expect("one record");
        assert_eq!(normalized.values.len(), 6);
        assert_eq!(normalized.values["aqi"], MetricValue::Numeric(61.0));
        assert_eq!(normalized.values["pm2.5_avg"], MetricValue::Numeric(20.3));
        assert_eq!(normalized.values["o3"], MetricValue::Absent);
        assert_eq!(normalized.site_label.as_deref(), Some("頭份"));
        assert_eq!(normalized.source_timestamp.as_deref(), Some("2024-01-01 10:00"));
    }

    #[test]
    fn test_normalize_air_quality_empty_payload_is_shape_error() {
        let result = normalize_air_quality(&Vec::new());
        assert!(
            matches!(result, Err(FetchError::Shape(_))),
            "empty payload should be a shape error, got {:?}",
            result
        );
    }

    // --- Forecast -----------------------------------------------------------

    fn slot(element: &str, time: &str, value: &str) -> RawRecord {
        record(json!({
            "site": "頭份市",
            "element": element,
            "time": time,
            "value": value,
        }))
    }

    #[test]
    fn test_normalize_forecast_selects_slot_per_element() {
        // now = 2024-01-01 10:30 Taipei
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 2, 30, 0).unwrap();
        let payload = vec![
            slot("T", "2024-01-01 09:00:00", "17"),
            slot("T", "2024-01-01 12:00:00", "21"),
            slot("T", "2024-01-01 15:00:00", "23"),
            slot("PoP6h", "2024-01-01 06:00:00", "10"),
            slot("PoP6h", "2024-01-01 12:00:00", "40"),
            slot("WS", "2024-01-01 12:00:00", ">= 11"),
        ];
        let normalized = normalize_forecast(&payload, now, taipei()).expect("known elements");

        assert_eq!(normalized.values["temperature"], MetricValue::Numeric(21.0));
        assert_eq!(normalized.values["precipitation_probability"], MetricValue::Numeric(40.0));
        assert_eq!(normalized.values["wind"], MetricValue::NonNumeric(">= 11".into()));
        assert_eq!(normalized.values["humidity"], MetricValue::Absent);
        assert_eq!(normalized.values.len(), 6);
        assert_eq!(normalized.site_label.as_deref(), Some("頭份市"));
        assert_eq!(normalized.source_timestamp.as_deref(), Some("2024-01-01 12:00:00"));
    }

    #[test]
    fn test_normalize_forecast_past_slots_fall_back_to_first() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let payload = vec![
            slot("RH", "2024-01-01 09:00:00", "80"),
            slot("RH", "2024-01-01 12:00:00", "70"),
        ];
        let normalized = normalize_forecast(&payload, now, taipei()).expect("known element");
        assert_eq!(normalized.values["humidity"], MetricValue::Numeric(80.0));
        assert_eq!(normalized.source_timestamp.as_deref(), Some("2024-01-01 09:00:00"));
    }

    #[test]
    fn test_normalize_forecast_without_known_elements_is_shape_error() {
        let now = Utc::now();
        let payload = vec![slot("Wx", "2024-01-01 09:00:00", "多雲")];
        assert!(matches!(
            normalize_forecast(&payload, now, taipei()),
            Err(FetchError::Shape(_))
        ));
    }
}
