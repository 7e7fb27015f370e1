//! In-memory vector caches
//!
//! Provides:
//! - A capacity-bounded LRU with per-entry TTL
//! - Process-wide document/query vector cache instances
//! - Cache key builder helpers

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Capacity of the document-vector cache
pub const DOC_CACHE_CAPACITY: usize = 8192;

/// Capacity of the query-vector cache
pub const QUERY_CACHE_CAPACITY: usize = 512;

/// TTL for cached document vectors
pub const DOC_CACHE_TTL: Duration = Duration::from_secs(3600);

/// TTL for cached query vectors
pub const QUERY_CACHE_TTL: Duration = Duration::from_secs(900);

/// LRU cache with per-entry TTL.
///
/// Reads promote entries to most-recently-used; a read of an entry older
/// than the TTL evicts it and reports a miss. All operations take the
/// internal lock, so the cache can be shared across queries via `Arc`.
pub struct TtlLru<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, (V, Instant)>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlLru<K, V> {
    /// Create a cache bounded by `capacity` entries with the given TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is nonzero");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Look up a key, promoting it on hit. Stale entries are evicted.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock().expect("cache lock poisoned");
        let expired = match cache.get(key) {
            Some((_, inserted)) => inserted.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            cache.pop(key);
            return None;
        }
        cache.get(key).map(|(value, _)| value.clone())
    }

    /// Insert a value, evicting the least-recently-used entry when full.
    pub fn put(&self, key: K, value: V) {
        let mut cache = self.inner.lock().expect("cache lock poisoned");
        cache.put(key, (value, Instant::now()));
    }

    /// Number of live entries (stale entries count until read).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.inner.lock().expect("cache lock poisoned").clear();
        debug!("cache cleared");
    }
}

/// Vector cache keyed by the string keys from [`keys`].
pub type VectorCache = TtlLru<String, Vec<f32>>;

/// Build the document-vector cache with its standard capacity and TTL.
pub fn doc_vector_cache() -> VectorCache {
    TtlLru::new(DOC_CACHE_CAPACITY, DOC_CACHE_TTL)
}

/// Build the query-vector cache with its standard capacity and TTL.
pub fn query_vector_cache() -> VectorCache {
    TtlLru::new(QUERY_CACHE_CAPACITY, QUERY_CACHE_TTL)
}

/// Cache key builder helpers
pub mod keys {
    /// Build a document vector cache key
    pub fn doc_vector(text_hash: &[u8; 16], model: &str, dim: usize) -> String {
        format!("d:{}:{}:{}", hex::encode(text_hash), model, dim)
    }

    /// Build a query vector cache key
    pub fn query_vector(query: &str, model: &str, dim: usize) -> String {
        let digest = md5::compute(query.as_bytes());
        format!("q:{}:{}:{}", hex::encode(digest.0), model, dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let cache: TtlLru<String, Vec<f32>> = TtlLru::new(4, Duration::from_secs(60));
        cache.put("a".into(), vec![1.0, 2.0]);
        assert_eq!(cache.get(&"a".to_string()), Some(vec![1.0, 2.0]));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache: TtlLru<u32, u32> = TtlLru::new(2, Duration::from_secs(60));
        cache.put(1, 10);
        cache.put(2, 20);
        // Touch 1 so 2 becomes the eviction candidate.
        assert_eq!(cache.get(&1), Some(10));
        cache.put(3, 30);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&3), Some(30));
    }

    #[test]
    fn test_stale_read_evicts() {
        let cache: TtlLru<u32, u32> = TtlLru::new(4, Duration::from_millis(0));
        cache.put(1, 10);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_builders() {
        let hash = [0u8; 16];
        let key = keys::doc_vector(&hash, "text-embedding-3-small", 512);
        assert!(key.starts_with("d:"));
        assert!(key.ends_with(":text-embedding-3-small:512"));

        let qkey = keys::query_vector("what year", "text-embedding-3-small", 512);
        assert!(qkey.starts_with("q:"));
    }
}
