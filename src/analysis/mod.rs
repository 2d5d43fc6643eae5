/// Pure data transformation for the refresh pipeline.
///
/// Nothing here holds state or performs I/O; the refresh coordinator in
/// `cache::store` supplies every input, including the outgoing snapshot.
///
/// Submodules:
/// - `normalize` — raw provider payload → canonical tri-state values.
/// - `trend` — signed delta against the previously cached value.
/// - `enrich` — classification + trend → publishable `Snapshot`.

pub mod enrich;
pub mod normalize;
pub mod trend;
