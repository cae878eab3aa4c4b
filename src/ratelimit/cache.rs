//! Windowed counter cache.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::trace;

use super::key::CounterKey;

/// Cached aggregate for one counter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    /// Start of the window or bucket this count belongs to
    pub anchor: DateTime<Utc>,
    /// Admitted requests counted since `anchor`
    pub count: u64,
    /// Instant after which the entry no longer counts as live
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new entry.
    pub fn new(anchor: DateTime<Utc>, count: u64, expires_at: DateTime<Utc>) -> Self {
        Self {
            anchor,
            count,
            expires_at,
        }
    }

    /// Whether the entry's TTL has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent cache of windowed counters.
///
/// Purely an optimization over the event store: a missing or expired entry
/// means "recompute from the store", never "zero requests made". Expired
/// entries are dropped on read, and a full purge runs whenever the map
/// grows past its configured capacity.
#[derive(Debug)]
pub struct CounterCache {
    entries: DashMap<CounterKey, CacheEntry>,
    max_entries: usize,
}

impl CounterCache {
    /// Create a cache that purges once it holds more than `max_entries`.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Get the live entry for a key, dropping it if expired.
    pub fn get(&self, key: &CounterKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = self.entries.get(key).map(|e| *e)?;
        if entry.is_expired(now) {
            trace!(key = %key, "Dropping expired counter cache entry");
            self.entries.remove(key);
            return None;
        }
        Some(entry)
    }

    /// Insert or replace the entry for a key.
    pub fn put(&self, key: CounterKey, entry: CacheEntry, now: DateTime<Utc>) {
        if self.entries.len() >= self.max_entries {
            self.purge_expired(now);
        }
        self.entries.insert(key, entry);
    }

    /// Bump a live entry's count, sliding its anchor and expiry forward.
    ///
    /// Returns the new count, or `None` if the key is absent (the caller
    /// must treat that as a miss and recompute).
    pub fn increment(
        &self,
        key: &CounterKey,
        anchor: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Option<u64> {
        self.entries.get_mut(key).map(|mut entry| {
            entry.count += 1;
            entry.anchor = anchor;
            entry.expires_at = expires_at;
            entry.count
        })
    }

    /// Remove the entry for a key.
    pub fn remove(&self, key: &CounterKey) {
        self.entries.remove(key);
    }

    /// Drop every entry whose TTL has passed.
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Number of entries currently held, live or not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::Strategy;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn key(identifier: &str) -> CounterKey {
        CounterKey::new(identifier, "/api/ping/", Strategy::Sliding)
    }

    #[test]
    fn test_put_and_get() {
        let cache = CounterCache::new(100);
        let k = key("alice");

        cache.put(k.clone(), CacheEntry::new(ts(0), 3, ts(60)), ts(0));

        let entry = cache.get(&k, ts(30)).unwrap();
        assert_eq!(entry.count, 3);
        assert_eq!(entry.anchor, ts(0));
    }

    #[test]
    fn test_expired_entry_is_absent_and_dropped() {
        let cache = CounterCache::new(100);
        let k = key("alice");

        cache.put(k.clone(), CacheEntry::new(ts(0), 3, ts(60)), ts(0));

        // Expiry is inclusive: at exactly `expires_at` the entry is gone.
        assert!(cache.get(&k, ts(60)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_increment_slides_entry_forward() {
        let cache = CounterCache::new(100);
        let k = key("alice");

        cache.put(k.clone(), CacheEntry::new(ts(0), 1, ts(60)), ts(0));

        let count = cache.increment(&k, ts(10), ts(70)).unwrap();
        assert_eq!(count, 2);

        let entry = cache.get(&k, ts(65)).unwrap();
        assert_eq!(entry.anchor, ts(10));
        assert_eq!(entry.expires_at, ts(70));
    }

    #[test]
    fn test_increment_missing_key_is_absent() {
        let cache = CounterCache::new(100);
        assert_eq!(cache.increment(&key("ghost"), ts(0), ts(60)), None);
    }

    #[test]
    fn test_put_past_capacity_purges_expired() {
        let cache = CounterCache::new(2);

        cache.put(key("a"), CacheEntry::new(ts(0), 1, ts(10)), ts(0));
        cache.put(key("b"), CacheEntry::new(ts(0), 1, ts(10)), ts(0));
        assert_eq!(cache.len(), 2);

        // Both existing entries expired by ts(20); the put sweeps them out.
        cache.put(key("c"), CacheEntry::new(ts(20), 1, ts(80)), ts(20));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("c"), ts(20)).is_some());
    }

    #[test]
    fn test_remove() {
        let cache = CounterCache::new(100);
        let k = key("alice");

        cache.put(k.clone(), CacheEntry::new(ts(0), 1, ts(60)), ts(0));
        cache.remove(&k);
        assert!(cache.get(&k, ts(1)).is_none());
    }
}
