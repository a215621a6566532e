//! Cache entries and freshness arithmetic

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A successful upstream response together with the time it was fetched
///
/// Whether an entry came from the API or the cache is never stored; it is
/// derived from `cached_at` when the entry is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The upstream response body, stored as-is
    pub data: Value,
    /// When the successful fetch completed
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time
    pub fn new(data: Value) -> Self {
        Self::with_timestamp(data, Utc::now())
    }

    pub fn with_timestamp(data: Value, cached_at: DateTime<Utc>) -> Self {
        Self { data, cached_at }
    }

    /// Instant at which the entry expires under `ttl`
    pub fn expires_at(&self, ttl: std::time::Duration) -> DateTime<Utc> {
        Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.cached_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Age of the entry at `now`, clamped to zero if the clock went backwards
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.cached_at).max(Duration::zero())
    }
}

/// Freshness of an entry relative to a TTL at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    /// Whole seconds since the entry was cached
    pub age_seconds: i64,
    /// Whether the entry is older than the TTL
    pub is_expired: bool,
    /// Seconds left until the entry expires, never negative
    pub expires_in_seconds: u64,
}

impl Freshness {
    /// Evaluates an entry cached at `cached_at` against `ttl` at `now`
    pub fn evaluate(cached_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let age = (now - cached_at).max(Duration::zero());
        let remaining = (ttl.num_seconds() - age.num_seconds()).max(0);

        Self {
            age_seconds: age.num_seconds(),
            is_expired: age > ttl,
            expires_in_seconds: remaining as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_freshness_within_ttl() {
        let now = Utc::now();
        let freshness =
            Freshness::evaluate(now - Duration::seconds(100), now, Duration::seconds(300));

        assert_eq!(freshness.age_seconds, 100);
        assert_eq!(freshness.expires_in_seconds, 200);
        assert!(!freshness.is_expired);
    }

    #[test]
    fn test_freshness_past_ttl() {
        let now = Utc::now();
        let freshness =
            Freshness::evaluate(now - Duration::seconds(400), now, Duration::seconds(300));

        assert_eq!(freshness.age_seconds, 400);
        assert_eq!(freshness.expires_in_seconds, 0);
        assert!(freshness.is_expired);
    }

    #[test]
    fn test_freshness_exactly_at_ttl_is_not_expired() {
        let now = Utc::now();
        let freshness =
            Freshness::evaluate(now - Duration::seconds(300), now, Duration::seconds(300));

        assert!(!freshness.is_expired);
        assert_eq!(freshness.expires_in_seconds, 0);
    }

    #[test]
    fn test_freshness_clamps_future_timestamp() {
        let now = Utc::now();
        let freshness =
            Freshness::evaluate(now + Duration::seconds(30), now, Duration::seconds(300));

        assert_eq!(freshness.age_seconds, 0);
        assert_eq!(freshness.expires_in_seconds, 300);
        assert!(!freshness.is_expired);
    }

    #[test]
    fn test_freshness_counts_whole_seconds() {
        let now = Utc::now();
        let freshness =
            Freshness::evaluate(now - Duration::milliseconds(250), now, Duration::seconds(300));

        assert_eq!(freshness.age_seconds, 0);
        assert_eq!(freshness.expires_in_seconds, 300);
    }

    #[test]
    fn test_entry_age_at() {
        let now = Utc::now();
        let entry = CacheEntry::with_timestamp(json!({"t": 1}), now - Duration::seconds(42));

        assert_eq!(entry.age_at(now).num_seconds(), 42);
        assert_eq!(entry.age_at(now - Duration::seconds(100)), Duration::zero());
    }

    #[test]
    fn test_entry_expires_at() {
        let now = Utc::now();
        let entry = CacheEntry::with_timestamp(json!(null), now);

        assert_eq!(
            entry.expires_at(std::time::Duration::from_secs(300)),
            now + Duration::seconds(300)
        );
        assert_eq!(entry.expires_at(std::time::Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
