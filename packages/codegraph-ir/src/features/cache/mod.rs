//! Analysis Cache (spec §4.9, component C9).
//!
//! Keyed by SHA-256 of `(component_id, canonicalized inputs, ruleset
//! version, tier digest)` (spec §3 "Cache entry"). Entries are immutable:
//! invalidation is by key non-existence, never in-place mutation. Readers
//! never block each other; a sharded per-key lock makes concurrent writers
//! for the same key serialize and the second writer reuse the first's
//! result instead of duplicating parse/analyze work (spec §4.9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Builds a cache key from the component identity and every input that
/// affects its output. Order matters (it is baked into the digest), so
/// callers must pass arguments in a consistent order for a given
/// component.
pub fn cache_key(component_id: &str, content: &str, config_digest: &str, tier_digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(component_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(config_digest.as_bytes());
    hasher.update([0u8]);
    hasher.update(tier_digest.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Read-only snapshot of cache hit/miss/eviction counters (SPEC_FULL §11
/// "Cache metrics": an ambient observability concern, not a scanned
/// feature).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Fingerprinted result memoization for any single component output type
/// `V`. One `AnalysisCache<V>` per component kind (IR, PDG, taint
/// findings, ...) since the spec keys by `component_id` but a single typed
/// store per component is simpler and equally correct.
pub struct AnalysisCache<V> {
    store: RwLock<LruCache<String, Arc<V>>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    counters: Counters,
}

impl<V> AnalysisCache<V> {
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            store: RwLock::new(LruCache::new(cap)),
            key_locks: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Lock-free read path: a cache hit never touches the key-lock map.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let mut store = self.store.write();
        let hit = store.get(key).cloned();
        if hit.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock();
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Returns the cached value for `key`, computing it with `compute` on
    /// a miss. Concurrent callers for the same key serialize on that key's
    /// lock alone (other keys are unaffected) and the loser of the race
    /// reuses the winner's freshly inserted value rather than recomputing
    /// (spec §4.9).
    pub fn get_or_compute<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let key_lock = self.lock_for(key);
        let _guard = key_lock.lock();

        // Re-check: another writer may have finished while we waited for
        // the key lock.
        {
            let mut store = self.store.write();
            if let Some(hit) = store.get(key).cloned() {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
        }

        let value = Arc::new(compute()?);
        let mut store = self.store.write();
        let was_full = store.len() >= store.cap().get() && !store.contains(key);
        if was_full {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        store.put(key.to_string(), value.clone());
        Ok(value)
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            len: self.store.read().len(),
        }
    }

    /// Drops every entry. Used when a source unit changes and the project
    /// symbol table (and therefore everything downstream of it) must be
    /// rebuilt (spec §3 "Lifecycle": "Symbol tables are invalidated when
    /// any source unit in the project changes").
    pub fn clear(&self) {
        self.store.write().clear();
        self.key_locks.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cache_key_is_deterministic_and_input_sensitive() {
        let a = cache_key("ir", "def f(): pass", "cfg1", "community");
        let b = cache_key("ir", "def f(): pass", "cfg1", "community");
        let c = cache_key("ir", "def g(): pass", "cfg1", "community");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn get_or_compute_only_runs_once_per_key() {
        let cache: AnalysisCache<i32> = AnalysisCache::with_capacity(16);
        let calls = AtomicUsize::new(0);
        let key = cache_key("ir", "x", "cfg", "community");

        let v1 = cache.get_or_compute::<()>(&key, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        }).unwrap();
        let v2 = cache.get_or_compute::<()>(&key, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(99)
        }).unwrap();

        assert_eq!(*v1, 42);
        assert_eq!(*v2, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn miss_then_hit_updates_metrics() {
        let cache: AnalysisCache<i32> = AnalysisCache::with_capacity(4);
        let key = cache_key("ir", "x", "cfg", "community");
        cache.get_or_compute::<()>(&key, || Ok(1)).unwrap();
        cache.get_or_compute::<()>(&key, || Ok(1)).unwrap();
        let snap = cache.metrics();
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.hits, 1);
    }

    #[test]
    fn eviction_is_counted_once_capacity_is_exceeded() {
        let cache: AnalysisCache<i32> = AnalysisCache::with_capacity(1);
        cache.get_or_compute::<()>("a", || Ok(1)).unwrap();
        cache.get_or_compute::<()>("b", || Ok(2)).unwrap();
        assert_eq!(cache.metrics().evictions, 1);
    }
}
