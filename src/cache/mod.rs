/// Freshness-gated snapshot cache.
///
/// Submodules:
/// - `freshness` — TTL gate arithmetic with an injectable clock.
/// - `store` — per-domain entries and the refresh coordinator.
/// - `refresher` — optional background thread that keeps entries warm.

pub mod freshness;
pub mod refresher;
pub mod store;

pub use store::{CacheEntry, RefreshOutcome, SnapshotStore, StoreOptions};
