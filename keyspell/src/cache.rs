//! Bounded least-recently-used caches for query results.
//!
//! Caches never hold the source of truth; any entry may be dropped at any
//! time and the value recomputed from storage or the dictionary.
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub timestamp: Instant,
}

/// A thread-safe LRU cache of timestamped values.
pub struct Cache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
}

impl<K: Hash + Eq, V: Clone> Cache<K, V> {
    pub fn new(capacity: usize) -> Cache<K, V> {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Cache {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).map(|e| e.value.clone())
    }

    pub fn entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.lock().peek(key).cloned()
    }

    pub fn put(&self, key: K, value: V) {
        self.entries.lock().put(
            key,
            CacheEntry {
                value,
                timestamp: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().pop(key).map(|e| e.value)
    }

    /// Removes every entry whose key matches `predicate`.
    pub fn retain_keys<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
        K: Clone,
    {
        let mut entries = self.entries.lock();
        let doomed: Vec<K> = entries
            .iter()
            .filter(|(k, _)| !predicate(k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed.iter() {
            entries.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
