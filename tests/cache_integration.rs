/// Integration tests for the snapshot store
///
/// These tests drive the public store API with in-process providers only:
/// 1. TTL gate: at most one fetch per window, per domain
/// 2. Single-flight: concurrent readers on a stale entry cause one fetch
/// 3. Atomic publication: readers never observe a half-built snapshot
/// 4. Failure handling: previous readings survive with valid=false
/// 5. Full pipeline: payload → normalize → classify → trend → publish
///
/// No network access is needed.
///
/// Run with: cargo test --test cache_integration

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use airwatch_service::cache::{RefreshOutcome, SnapshotStore, StoreOptions};
use airwatch_service::dev_mode::{FixtureFile, FixtureProvider};
use airwatch_service::ingest::Provider;
use airwatch_service::model::{
    Domain, FetchError, MetricValue, RawPayload, RawRecord, Severity, SnapshotStatus, TrendDirection,
};

// ============================================================================
// Test providers
// ============================================================================

/// Counts fetches, optionally sleeping to widen race windows, and serves
/// payloads from a shared slot the test can swap.
struct CountingProvider {
    domain: Domain,
    calls: Arc<AtomicUsize>,
    delay: Duration,
    next: Arc<Mutex<Result<RawPayload, FetchError>>>,
}

impl CountingProvider {
    fn new(domain: Domain, payload: RawPayload, delay: Duration) -> Self {
        Self {
            domain,
            calls: Arc::new(AtomicUsize::new(0)),
            delay,
            next: Arc::new(Mutex::new(Ok(payload))),
        }
    }
}

impl Provider for CountingProvider {
    fn domain(&self) -> Domain {
        self.domain
    }

    fn name(&self) -> &str {
        "counting"
    }

    fn fetch(&self, _timeout: Duration) -> Result<RawPayload, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.next.lock().unwrap().clone()
    }
}

fn record(value: serde_json::Value) -> RawRecord {
    value.as_object().cloned().expect("test record must be an object")
}

fn aq_record(published: &str, aqi: &str, pm25: &str) -> RawRecord {
    record(json!({
        "sitename": "頭份",
        "datacreationdate": published,
        "aqi": aqi,
        "pm2.5": pm25,
        "pm2.5_avg": "10",
        "pm10": "20",
        "pm10_avg": "18",
        "o3": "35",
    }))
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
}

struct Harness {
    store: Arc<SnapshotStore>,
    aq_calls: Arc<AtomicUsize>,
    aq_next: Arc<Mutex<Result<RawPayload, FetchError>>>,
}

fn harness(aq_payload: RawPayload, delay: Duration) -> Harness {
    let aq = CountingProvider::new(Domain::AirQuality, aq_payload, delay);
    let aq_calls = Arc::clone(&aq.calls);
    let aq_next = Arc::clone(&aq.next);
    let fc = FixtureProvider::sample(Domain::Forecast);
    Harness {
        store: Arc::new(SnapshotStore::new(StoreOptions::default(), Box::new(aq), Box::new(fc))),
        aq_calls,
        aq_next,
    }
}

// ============================================================================
// TTL gate
// ============================================================================

#[test]
fn test_reads_within_ttl_fetch_once() {
    let h = harness(vec![aq_record("2024-05-01 20:00", "55", "10")], Duration::ZERO);

    for s in [0, 30, 120, 299] {
        h.store.get_snapshot_at(Domain::AirQuality, at(12, 0, 0) + chrono::Duration::seconds(s));
    }
    assert_eq!(h.aq_calls.load(Ordering::SeqCst), 1, "one fetch per 5-minute window");

    h.store.get_snapshot_at(Domain::AirQuality, at(12, 5, 0));
    assert_eq!(h.aq_calls.load(Ordering::SeqCst), 2, "window elapsed, second fetch expected");
}

#[test]
fn test_custom_ttl_is_honoured() {
    let aq = CountingProvider::new(Domain::AirQuality, vec![aq_record("2024-05-01 20:00", "55", "10")], Duration::ZERO);
    let calls = Arc::clone(&aq.calls);
    let options = StoreOptions {
        ttl: Duration::from_secs(60),
        ..StoreOptions::default()
    };
    let store = SnapshotStore::new(options, Box::new(aq), Box::new(FixtureProvider::sample(Domain::Forecast)));

    store.ensure_fresh_at(Domain::AirQuality, at(12, 0, 0));
    store.ensure_fresh_at(Domain::AirQuality, at(12, 0, 59));
    store.ensure_fresh_at(Domain::AirQuality, at(12, 1, 0));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Single-flight
// ============================================================================

#[test]
fn test_concurrent_readers_on_stale_entry_fetch_once() {
    const READERS: usize = 16;
    let h = harness(
        vec![aq_record("2024-05-01 20:00", "55", "10")],
        Duration::from_millis(200),
    );
    let barrier = Arc::new(Barrier::new(READERS));
    let now = at(12, 0, 0);

    let handles: Vec<_> = (0..READERS)
        .map(|_| {
            let store = Arc::clone(&h.store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.ensure_fresh_at(Domain::AirQuality, now)
            })
        })
        .collect();

    let outcomes: Vec<RefreshOutcome> = handles.into_iter().map(|t| t.join().unwrap()).collect();

    assert_eq!(h.aq_calls.load(Ordering::SeqCst), 1, "exactly one fetch for {} readers", READERS);
    assert_eq!(
        outcomes.iter().filter(|o| **o == RefreshOutcome::Refreshed).count(),
        1,
        "outcomes: {:?}",
        outcomes
    );
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, RefreshOutcome::Refreshed | RefreshOutcome::Fresh | RefreshOutcome::InFlight)),
        "outcomes: {:?}",
        outcomes
    );
    assert!(h.store.peek(Domain::AirQuality).valid);
}

#[test]
fn test_concurrent_readers_after_expiry_fetch_once_more() {
    const READERS: usize = 8;
    let h = harness(
        vec![aq_record("2024-05-01 20:00", "55", "10")],
        Duration::from_millis(100),
    );
    h.store.ensure_fresh_at(Domain::AirQuality, at(12, 0, 0));

    let barrier = Arc::new(Barrier::new(READERS));
    let later = at(12, 10, 0);
    let handles: Vec<_> = (0..READERS)
        .map(|_| {
            let store = Arc::clone(&h.store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.get_snapshot_at(Domain::AirQuality, later)
            })
        })
        .collect();

    for t in handles {
        let snap = t.join().unwrap();
        assert!(snap.valid, "readers past the gate see the refreshed snapshot");
    }
    assert_eq!(h.aq_calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Atomic publication
// ============================================================================

#[test]
fn test_readers_never_observe_mixed_snapshots() {
    // Every payload has aqi == pm2.5; a torn snapshot would break that.
    let h = harness(vec![aq_record("2024-05-01 20:00", "1", "1")], Duration::from_millis(2));
    let options_ttl = h.store.options().ttl;

    let writer = {
        let store = Arc::clone(&h.store);
        let next = Arc::clone(&h.aq_next);
        thread::spawn(move || {
            let mut now = at(12, 0, 0);
            for i in 2..40 {
                let v = i.to_string();
                *next.lock().unwrap() = Ok(vec![aq_record("2024-05-01 20:00", &v, &v)]);
                store.ensure_fresh_at(Domain::AirQuality, now);
                now = now + chrono::Duration::from_std(options_ttl).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&h.store);
            thread::spawn(move || {
                for _ in 0..500 {
                    let snap = store.peek(Domain::AirQuality);
                    let aqi = &snap.readings["aqi"].value;
                    let pm = &snap.readings["pm2.5"].value;
                    assert_eq!(aqi, pm, "torn snapshot observed");
                    assert_eq!(snap.readings.len(), 6);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn test_failure_keeps_previous_readings() {
    let h = harness(vec![aq_record("2024-05-01 20:00", "120", "40")], Duration::ZERO);
    let before = h.store.get_snapshot_at(Domain::AirQuality, at(12, 0, 0));
    assert_eq!(before.status(), SnapshotStatus::Fresh);

    *h.aq_next.lock().unwrap() = Err(FetchError::Timeout(10));
    let after = h.store.get_snapshot_at(Domain::AirQuality, at(12, 6, 0));

    assert_eq!(after.status(), SnapshotStatus::Stale);
    assert_eq!(after.readings, before.readings, "readings retained verbatim");
    assert_eq!(after.source_timestamp, before.source_timestamp);
    assert_eq!(after.readings["aqi"].severity, Severity::UnhealthyForSensitive);

    // Recovery on the next window.
    *h.aq_next.lock().unwrap() = Ok(vec![aq_record("2024-05-01 21:00", "80", "30")]);
    let recovered = h.store.get_snapshot_at(Domain::AirQuality, at(12, 12, 0));
    assert!(recovered.valid);
    assert_eq!(recovered.readings["aqi"].value, MetricValue::Numeric(80.0));
    assert_eq!(recovered.readings["aqi"].trend.map(|t| t.direction), Some(TrendDirection::Down));
}

#[test]
fn test_failure_before_any_success_stays_placeholder() {
    let h = harness(vec![], Duration::ZERO);
    *h.aq_next.lock().unwrap() = Err(FetchError::Transport("dns failure".into()));

    let snap = h.store.get_snapshot_at(Domain::AirQuality, at(12, 0, 0));
    assert_eq!(snap.status(), SnapshotStatus::NeverFetched);
    assert_eq!(snap.readings.len(), 6, "all keys present even without data");
    assert!(snap.readings.values().all(|r| r.severity == Severity::Unavailable));
    assert_eq!(snap.site_label, "頭份");
}

// ============================================================================
// Full pipeline
// ============================================================================

#[test]
fn test_latest_record_is_selected_and_classified() {
    let payload = vec![
        aq_record("2024-05-01 18:00", "30", "8"),
        aq_record("2024-05-01 20:00", "151", "60"),
        aq_record("2024-05-01 19:00", "90", "25"),
    ];
    let h = harness(payload, Duration::ZERO);
    let snap = h.store.get_snapshot_at(Domain::AirQuality, at(12, 0, 0));

    assert_eq!(snap.source_timestamp.as_deref(), Some("2024-05-01 20:00"));
    assert_eq!(snap.readings["aqi"].value, MetricValue::Numeric(151.0));
    assert_eq!(snap.readings["aqi"].severity, Severity::Unhealthy);
    assert_eq!(snap.readings["aqi"].label, "不健康");
    assert!(snap.readings.values().all(|r| r.trend.is_none()), "first fetch has no trend");
}

#[test]
fn test_non_numeric_field_is_unavailable_not_failure() {
    let mut rec = aq_record("2024-05-01 20:00", "45", "10");
    rec.insert("o3".to_string(), json!("ND"));
    let h = harness(vec![rec], Duration::ZERO);

    let snap = h.store.get_snapshot_at(Domain::AirQuality, at(12, 0, 0));
    assert!(snap.valid);
    assert_eq!(snap.readings["o3"].value, MetricValue::NonNumeric("ND".to_string()));
    assert_eq!(snap.readings["o3"].severity, Severity::Unavailable);
    assert_eq!(snap.readings["aqi"].severity, Severity::Good);
}

#[test]
fn test_sample_fixture_file_bootstraps_both_domains() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/sample.json");
    let (aq, fc) = FixtureFile::load(&path).expect("bundled fixture loads").into_providers();
    let store = SnapshotStore::bootstrap(StoreOptions::default(), Box::new(aq), Box::new(fc));

    let air = store.peek(Domain::AirQuality);
    assert!(air.valid);
    assert_eq!(air.site_label, "頭份");
    assert!(air.readings["aqi"].value.as_f64().is_some());

    let forecast = store.peek(Domain::Forecast);
    assert!(forecast.valid);
    assert_eq!(forecast.site_label, "頭份市");
    assert_eq!(forecast.readings.len(), 6);
}
