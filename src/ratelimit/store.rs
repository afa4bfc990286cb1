//! Keyed record storage owned by a single limiter.

use dashmap::DashMap;

use super::record::RateRecord;

/// Outcome of counting one request against the store.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    /// The record after the increment
    pub record: RateRecord,
    /// Whether this request opened a new window
    pub new_window: bool,
}

/// Map from key to its current [`RateRecord`].
///
/// Every mutation of a key runs under that key's shard lock, so the
/// look-up, reset, increment sequence is atomic per key.
#[derive(Debug, Default)]
pub struct RateLimiterStore {
    records: DashMap<String, RateRecord>,
}

impl RateLimiterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `key` at `now_ms`.
    ///
    /// A missing or stale record is replaced by a fresh window before counting.
    pub fn record_hit(&self, key: &str, now_ms: u64, window_ms: u64) -> Hit {
        let mut new_window = false;
        let mut record = self
            .records
            .entry(key.to_owned())
            .or_insert_with(|| {
                new_window = true;
                RateRecord::fresh(now_ms, window_ms)
            });

        if record.is_expired(now_ms) {
            *record = RateRecord::fresh(now_ms, window_ms);
            new_window = true;
        }
        record.increment();

        Hit {
            record: *record,
            new_window,
        }
    }

    /// Get a copy of the record stored for `key`, stale or not.
    pub fn get(&self, key: &str) -> Option<RateRecord> {
        self.records.get(key).map(|r| *r.value())
    }

    /// Remove every record whose window has lapsed at `now_ms`.
    ///
    /// Expired keys are snapshotted first and each is removed only if it is
    /// still expired under its lock, so a key refreshed by a concurrent
    /// request in between is kept. Returns the number of records removed.
    pub fn sweep_expired(&self, now_ms: u64) -> usize {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.value().is_expired(now_ms))
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .iter()
            .filter(|key| {
                self.records
                    .remove_if(key.as_str(), |_, record| record.is_expired(now_ms))
                    .is_some()
            })
            .count()
    }

    /// Number of stored records, including stale ones not yet swept.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records.
    pub fn clear(&self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_hit_opens_window() {
        let store = RateLimiterStore::new();
        let hit = store.record_hit("a", 0, 1_000);

        assert!(hit.new_window);
        assert_eq!(hit.record.count(), 1);
        assert_eq!(hit.record.window_reset_at_ms(), 1_000);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_hits_accumulate_within_window() {
        let store = RateLimiterStore::new();
        store.record_hit("a", 0, 1_000);
        let hit = store.record_hit("a", 999, 1_000);

        assert!(!hit.new_window);
        assert_eq!(hit.record.count(), 2);
        assert_eq!(hit.record.window_reset_at_ms(), 1_000);
    }

    #[test]
    fn test_stale_record_is_replaced() {
        let store = RateLimiterStore::new();
        for _ in 0..5 {
            store.record_hit("a", 0, 1_000);
        }

        let hit = store.record_hit("a", 1_000, 1_000);
        assert!(hit.new_window);
        assert_eq!(hit.record.count(), 1);
        assert_eq!(hit.record.window_reset_at_ms(), 2_000);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = RateLimiterStore::new();
        store.record_hit("old", 0, 1_000);
        store.record_hit("live", 500, 1_000);

        let removed = store.sweep_expired(1_000);

        assert_eq!(removed, 1);
        assert!(store.get("old").is_none());
        assert_eq!(store.get("live").map(|r| r.count()), Some(1));
    }

    #[test]
    fn test_sweep_on_empty_store() {
        let store = RateLimiterStore::new();
        assert_eq!(store.sweep_expired(u64::MAX), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let store = RateLimiterStore::new();
        store.record_hit("a", 0, 1_000);
        store.record_hit("b", 0, 1_000);
        store.clear();
        assert!(store.is_empty());
    }
}
