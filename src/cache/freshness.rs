/// Refresh due-ness (the TTL gate).
///
/// Both upstream providers publish hourly at best and are slow to answer, so
/// a domain is refreshed at most once per TTL window no matter how many
/// readers arrive. The window is measured from the last refresh *attempt*,
/// successful or not, so a failing provider is retried once per TTL rather
/// than on every request.
///
/// # Clock injection
/// All functions accept a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally. This makes the gate purely deterministic in
/// tests without mocking or time manipulation.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default minimum interval between refresh attempts for one domain.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Returns `true` if a refresh should be attempted at `now`.
///
/// Due-ness is defined as age greater than or equal to the TTL:
///   age <  ttl → not due
///   age >= ttl → due
///
/// An unset `last_attempt` (nothing attempted yet) is always due. A
/// `last_attempt` later than `now` is not due: a reader that sampled the
/// clock just before another reader's refresh must not refresh again.
pub fn refresh_due_at(
    last_attempt: Option<DateTime<Utc>>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last_attempt else {
        return true;
    };
    match (now - last).to_std() {
        Ok(age) => age >= ttl,
        Err(_) => false,
    }
}

/// Age of the last attempt in whole seconds, for logging.
pub fn attempt_age_secs(last_attempt: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    last_attempt.map(|last| (now - last).num_seconds())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
