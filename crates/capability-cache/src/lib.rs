//! TTL-bounded caches shared across the pipeline (spec §4.5, §5, §9): the matcher's
//! transitive-reliability cache ("Cached with a 60-second TTL; cache cleared on any dependency
//! write") and similar per-key memoization needs. Mirrors the host stack's
//! `codegraph-cache::cache::CacheEntry` shape (value + timestamps + TTL), generalized to any
//! key/value pair instead of being specific to one cache.

use capability_core::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

/// A cache where every entry expires `ttl` after insertion. Entries are trimmed lazily on read
/// (spec §9: "avoid unbounded growth ... trimming entries older than the TTL lazily on read"),
/// not by a background sweep.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs as i64),
            clock,
        }
    }

    /// Returns the cached value if present and not yet expired. An expired entry is removed
    /// as a side effect, so it never counts toward the cache's size again.
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => self.clock.now() - entry.inserted_at >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            None
        } else {
            self.entries.get(key).map(|e| e.value.clone())
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: self.clock.now(),
            },
        );
    }

    /// Drops every entry. Called on any dependency write (spec §4.5: "cache cleared on any
    /// `addDependency` / `updateDependency` / `removeDependency`").
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capability_core::clock::FixedClock;

    #[test]
    fn entries_expire_after_ttl_and_are_evicted_on_read() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let cache: TtlCache<String, f64> = TtlCache::new(60, clock.clone());
        cache.insert("cap-a".to_string(), 0.9);
        assert_eq!(cache.get(&"cap-a".to_string()), Some(0.9));

        clock.advance(Duration::seconds(61));
        assert_eq!(cache.get(&"cap-a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_all_clears_every_entry() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let cache: TtlCache<String, f64> = TtlCache::new(60, clock);
        cache.insert("a".to_string(), 1.0);
        cache.insert("b".to_string(), 1.0);
        assert_eq!(cache.len(), 2);
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
