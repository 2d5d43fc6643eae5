//! Freshness-gated snapshot service for a township's air quality and
//! weather forecast.
//!
//! Readers ask the [`cache::SnapshotStore`] for a domain's snapshot; the
//! store refreshes from the upstream provider at most once per TTL window
//! and otherwise serves what it already holds.

pub mod analysis;
pub mod cache;
pub mod classify;
pub mod config;
pub mod dev_mode;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod registry;
pub mod verify;
