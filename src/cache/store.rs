/// Snapshot store and refresh coordinator.
///
/// The store owns one cache entry per domain for the lifetime of the
/// process. Readers call `get_snapshot`, which runs the TTL gate and, when a
/// refresh is due, the fetch → normalize → classify/trend → publish
/// pipeline inline on the calling thread.
///
/// # Locking
/// Each domain has two locks:
/// - `entry: RwLock<CacheEntry>` guards the published snapshot and the last
///   attempt time. It is held only long enough to clone an `Arc` or swap one
///   in, so readers never wait on network I/O behind it.
/// - `refresh: Mutex<()>` is the exclusive refresh section. Only readers
///   that observed a due refresh take it; the TTL is re-checked once inside
///   so a crowd of readers arriving at a stale entry produces one fetch.
///
/// Publication replaces the whole `Arc<Snapshot>` under the write lock, so a
/// reader sees either the old snapshot or the new one, never a mix.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::analysis::{enrich, normalize};
use crate::cache::freshness;
use crate::classify::ThresholdTable;
use crate::config::AppConfig;
use crate::ingest::Provider;
use crate::logging::{self, Source};
use crate::model::{Domain, FetchError, MetricValue, RawPayload, Snapshot};
use crate::registry;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Static settings supplied at construction.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub ttl: Duration,
    pub fetch_timeout: Duration,
    /// Zone of the providers' naive timestamps.
    pub tz: Tz,
    pub thresholds: ThresholdTable,
    pub air_quality_label: String,
    pub forecast_label: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            ttl: freshness::DEFAULT_TTL,
            fetch_timeout: Duration::from_secs(10),
            tz: chrono_tz::Asia::Taipei,
            thresholds: ThresholdTable::default(),
            air_quality_label: "頭份".to_string(),
            forecast_label: "頭份市".to_string(),
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ttl: config.ttl(),
            fetch_timeout: config.fetch_timeout(),
            tz: config.tz(),
            thresholds: ThresholdTable::with_overrides(&config.thresholds),
            air_quality_label: config.default_site_label(Domain::AirQuality).to_string(),
            forecast_label: config.default_site_label(Domain::Forecast).to_string(),
        }
    }

    fn default_label(&self, domain: Domain) -> &str {
        match domain {
            Domain::AirQuality => &self.air_quality_label,
            Domain::Forecast => &self.forecast_label,
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// The published state of one domain.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: Arc<Snapshot>,
    /// Last refresh attempt, successful or not. Drives the TTL gate.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// What a call to `ensure_fresh` did.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Within the TTL window (possibly after another reader refreshed).
    Fresh,
    /// First fetch is already running on another thread.
    InFlight,
    /// This call fetched and published a valid snapshot.
    Refreshed,
    /// This call fetched and failed; the previous readings were kept.
    Failed(FetchError),
}

struct DomainSlot {
    provider: Box<dyn Provider>,
    entry: RwLock<CacheEntry>,
    refresh: Mutex<()>,
    in_flight: AtomicBool,
}

impl DomainSlot {
    fn new(domain: Domain, provider: Box<dyn Provider>, label: &str) -> Self {
        let placeholder = Snapshot::placeholder(domain, registry::metric_names(domain), label);
        Self {
            provider,
            entry: RwLock::new(CacheEntry {
                snapshot: Arc::new(placeholder),
                last_attempt_at: None,
            }),
            refresh: Mutex::new(()),
            in_flight: AtomicBool::new(false),
        }
    }

    fn read(&self) -> CacheEntry {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, snapshot: Snapshot, attempted_at: DateTime<Utc>) {
        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        entry.snapshot = Arc::new(snapshot);
        entry.last_attempt_at = Some(attempted_at);
    }
}

/// Clears the in-flight flag even if the provider panics.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Holder of the air-quality and forecast snapshots.
///
/// Constructed once by the composition root and shared as
/// `Arc<SnapshotStore>`; there is no global instance.
pub struct SnapshotStore {
    options: StoreOptions,
    air_quality: DomainSlot,
    forecast: DomainSlot,
}

impl SnapshotStore {
    /// Creates a store holding placeholder snapshots. Nothing is fetched
    /// until the first `ensure_fresh`; see `bootstrap`.
    pub fn new(
        options: StoreOptions,
        air_quality: Box<dyn Provider>,
        forecast: Box<dyn Provider>,
    ) -> Self {
        let air_quality = DomainSlot::new(Domain::AirQuality, air_quality, &options.air_quality_label);
        let forecast = DomainSlot::new(Domain::Forecast, forecast, &options.forecast_label);
        Self {
            options,
            air_quality,
            forecast,
        }
    }

    /// Creates a store and synchronously fetches both domains once.
    /// Failed fetches are tolerated; the entry starts with `valid=false`.
    pub fn bootstrap(
        options: StoreOptions,
        air_quality: Box<dyn Provider>,
        forecast: Box<dyn Provider>,
    ) -> Self {
        let store = Self::new(options, air_quality, forecast);
        logging::info(Source::Cache, None, "bootstrap: fetching both domains");
        for domain in Domain::ALL {
            store.ensure_fresh(domain);
        }
        store
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn slot(&self, domain: Domain) -> &DomainSlot {
        match domain {
            Domain::AirQuality => &self.air_quality,
            Domain::Forecast => &self.forecast,
        }
    }

    // --- Reader API ---------------------------------------------------------

    /// Returns the current snapshot for `domain`, refreshing first if due.
    pub fn get_snapshot(&self, domain: Domain) -> Arc<Snapshot> {
        self.get_snapshot_at(domain, Utc::now())
    }

    /// `get_snapshot` with an injected clock.
    pub fn get_snapshot_at(&self, domain: Domain, now: DateTime<Utc>) -> Arc<Snapshot> {
        self.ensure_fresh_at(domain, now);
        self.peek(domain)
    }

    /// The published snapshot, without running the TTL gate.
    pub fn peek(&self, domain: Domain) -> Arc<Snapshot> {
        self.slot(domain).read().snapshot
    }

    /// Copy of the whole cache entry for `domain`.
    pub fn entry(&self, domain: Domain) -> CacheEntry {
        self.slot(domain).read()
    }

    // --- Freshness gate -----------------------------------------------------

    pub fn ensure_fresh(&self, domain: Domain) -> RefreshOutcome {
        self.ensure_fresh_at(domain, Utc::now())
    }

    /// Runs the double-checked TTL gate for `domain` at `now`.
    pub fn ensure_fresh_at(&self, domain: Domain, now: DateTime<Utc>) -> RefreshOutcome {
        let slot = self.slot(domain);
        let ttl = self.options.ttl;

        // Fast path: no refresh section, just the read lock.
        let last = slot.read().last_attempt_at;
        if !freshness::refresh_due_at(last, ttl, now) {
            return RefreshOutcome::Fresh;
        }
        if last.is_none() && slot.in_flight.load(Ordering::Acquire) {
            return RefreshOutcome::InFlight;
        }

        let _section = slot.refresh.lock().unwrap_or_else(PoisonError::into_inner);

        // Another reader may have refreshed while we waited.
        let last = slot.read().last_attempt_at;
        if !freshness::refresh_due_at(last, ttl, now) {
            return RefreshOutcome::Fresh;
        }

        logging::debug(
            Source::Cache,
            Some(domain.as_str()),
            &match freshness::attempt_age_secs(last, now) {
                Some(age) => format!("last attempt {}s ago, refreshing", age),
                None => "no attempt yet, refreshing".to_string(),
            },
        );

        let _in_flight = InFlightGuard::set(&slot.in_flight);
        self.refresh_locked(domain, slot, now)
    }

    /// Fetch → normalize → classify/trend → publish. Caller holds the
    /// domain's refresh section.
    fn refresh_locked(&self, domain: Domain, slot: &DomainSlot, now: DateTime<Utc>) -> RefreshOutcome {
        // Captured before fetching: trends compare against this snapshot.
        let previous = slot.read().snapshot;

        let result = fetch_contained(slot.provider.as_ref(), self.options.fetch_timeout)
            .and_then(|payload| normalize::normalize(domain, &payload, now, self.options.tz));

        match result {
            Ok(normalized) => {
                let next = enrich::build_snapshot(
                    domain,
                    normalized,
                    &previous,
                    &self.options.thresholds,
                    self.options.default_label(domain),
                    Utc::now(),
                );
                let available = next
                    .readings
                    .values()
                    .filter(|r| matches!(r.value, MetricValue::Numeric(_)))
                    .count();
                logging::log_refresh_success(
                    domain,
                    &next.site_label,
                    next.source_timestamp.as_deref(),
                    available,
                    next.readings.len(),
                );
                slot.publish(next, now);
                RefreshOutcome::Refreshed
            }
            Err(err) => {
                logging::log_fetch_failure(domain, &previous.site_label, &err);
                slot.publish(previous.degraded(), now);
                RefreshOutcome::Failed(err)
            }
        }
    }
}

/// Runs a provider fetch, turning a panic into `FetchError::Panic` so the
/// attempt is still recorded and the reader gets the previous snapshot.
fn fetch_contained(provider: &dyn Provider, timeout: Duration) -> Result<RawPayload, FetchError> {
    panic::catch_unwind(AssertUnwindSafe(|| provider.fetch(timeout))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| format!("{} provider", provider.name()));
        Err(FetchError::Panic(message))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
