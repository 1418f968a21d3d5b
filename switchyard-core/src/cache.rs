//! Read-optimized lookup caches.
//!
//! Route tables and strategy lists are frozen once the dispatcher is built.
//! The only state written while requests are being served is a handful of
//! memoized lookups: compiled path segments, the adapter chosen for a handler
//! type and lazily resolved handler names. They all share [`LookupCache`]:
//!
//! - Reads take a shared `parking_lot::RwLock` guard and clone the value out.
//! - Writes insert a complete value under the exclusive guard, so a reader
//!   either sees nothing or the whole entry.
//! - Two requests missing the same key may both compute the value; the later
//!   insert wins and both values are equivalent.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hit/miss counters for a cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Concurrent memoization map with an optional size cap.
///
/// Once `capacity` entries are stored, new keys are no longer cached and
/// callers simply recompute. This keeps caches keyed on request data (such as
/// path segments) from growing without bound.
pub struct LookupCache<K, V> {
    inner: RwLock<HashMap<K, V>>,
    capacity: Option<usize>,
    stats: CacheStats,
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            capacity: None,
            stats: CacheStats::default(),
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let found = self.inner.read().get(key).cloned();
        let counter = if found.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store a value. Returns `false` when the cache is full and the value
    /// was not stored.
    pub fn insert(&self, key: K, value: V) -> bool {
        let mut map = self.inner.write();
        if let Some(cap) = self.capacity
            && map.len() >= cap
            && !map.contains_key(&key)
        {
            return false;
        }
        map.insert(key, value);
        true
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// `compute` runs without holding the lock.
    pub fn get_or_insert_with<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(v) = self.get(&key) {
            return v;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<K, V> Default for LookupCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for LookupCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCache")
            .field("len", &self.inner.read().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let cache: LookupCache<&str, usize> = LookupCache::new();
        let mut calls = 0;
        let v = cache.get_or_insert_with("a", || {
            calls += 1;
            1
        });
        assert_eq!(v, 1);
        let v = cache.get_or_insert_with("a", || {
            calls += 1;
            2
        });
        assert_eq!(v, 1);
        assert_eq!(calls, 1);
        assert_eq!(cache.stats().hits(), 1);
    }

    #[test]
    fn test_bounded_cache_stops_growing() {
        let cache: LookupCache<u32, u32> = LookupCache::bounded(2);
        assert!(cache.insert(1, 1));
        assert!(cache.insert(2, 2));
        assert!(!cache.insert(3, 3));
        // replacing an existing key is still allowed
        assert!(cache.insert(2, 20));
        assert_eq!(cache.get(&2), Some(20));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_population() {
        let cache: Arc<LookupCache<u32, String>> = Arc::new(LookupCache::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for key in 0..50u32 {
                        let v = cache.get_or_insert_with(key, || format!("value-{}", key));
                        assert_eq!(v, format!("value-{}", key), "thread {}", i);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(cache.len(), 50);
    }
}
