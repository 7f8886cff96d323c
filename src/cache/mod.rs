// =============================================================================
// Result Cache — TTL memoization
// =============================================================================
//
// `TtlCache` answers reads only while an entry is live (`now < expires_at`);
// expired and missing entries are the same transparent miss. The `*_at`
// variants take an explicit clock so tests and warm starts can pin time.
//
// Two policies run on top of it: quotes (30 s) and scan rows (4 h, keyed by
// symbol and interval).
// =============================================================================

pub mod snapshot;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

pub use snapshot::ScanSnapshot;

/// A cached value together with the instant it stops being served.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Hit / miss counters plus the current entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe map whose entries expire `ttl` after insertion.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    /// Live value for `key` as seen at `now`.
    pub fn get_at(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let found = self
            .entries
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Utc::now());
    }

    /// Insert as if written at `now`; the entry expires at `now + ttl`.
    pub fn insert_at(&self, key: K, value: V, now: DateTime<Utc>) {
        self.insert_until(key, value, now + self.ttl);
    }

    /// Insert with an explicit expiry, used when restoring persisted rows.
    pub fn insert_until(&self, key: K, value: V, expires_at: DateTime<Utc>) {
        self.entries
            .write()
            .insert(key, CacheEntry { value, expires_at });
    }

    /// Drop every entry that is no longer live at `now`. Returns how many
    /// were removed.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
