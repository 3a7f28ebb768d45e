//! Bounded LRU cache for rendered chart bytes
//!
//! Entries are keyed by a fingerprint of the chart id and a hash of the
//! chart's source data, never of the rendered output, so identical inputs
//! hit even when rendering is not byte-for-byte deterministic.
//!
//! Bookkeeping sits behind one mutex: get+promote and put+evict are each
//! atomic. Rendering on a miss happens outside the lock, so different
//! charts can be produced concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

/// Hash of a chart's source data
pub fn data_fingerprint(data: &serde_json::Value) -> String {
    // serde_json's default map is ordered, so equal values serialize equally
    let canonical = serde_json::to_vec(data).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

/// Cache key combining chart identity and data fingerprint
pub fn cache_key(chart_id: &str, data_fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chart_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(data_fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
}

#[derive(Debug)]
struct CacheEntry {
    chart_id: String,
    data_fingerprint: String,
    value: Arc<[u8]>,
    /// Logical access time; larger is more recent
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// last_used -> key, oldest first
    recency: BTreeMap<u64, String>,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &str) {
        let now = self.tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.last_used);
            entry.last_used = now;
            self.recency.insert(now, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.last_used);
        }
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

#[derive(Debug)]
pub struct ChartCache {
    max_size: usize,
    state: Mutex<CacheState>,
}

impl Default for ChartCache {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ChartCache {
    /// A cache holding at most `max_size` charts (at least one)
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn get(&self, chart_id: &str, data_fingerprint: &str) -> Option<Arc<[u8]>> {
        let key = cache_key(chart_id, data_fingerprint);
        let mut state = self.state.lock();
        let value = state.entries.get(&key).map(|e| Arc::clone(&e.value));
        match value {
            Some(value) => {
                state.hits += 1;
                state.touch(&key);
                trace!(chart_id, "Chart cache hit");
                Some(value)
            }
            None => {
                state.misses += 1;
                trace!(chart_id, "Chart cache miss");
                None
            }
        }
    }

    /// Insert or refresh an entry, evicting the least recently used one when full
    pub fn put(&self, chart_id: &str, data_fingerprint: &str, bytes: impl Into<Arc<[u8]>>) {
        let key = cache_key(chart_id, data_fingerprint);
        let value = bytes.into();
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.value = value;
            state.touch(&key);
            return;
        }

        while state.entries.len() >= self.max_size {
            match state.evict_oldest() {
                Some(evicted) => debug!(key = %evicted, "Evicted chart from cache"),
                None => break,
            }
        }

        let now = state.tick();
        state.recency.insert(now, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                chart_id: chart_id.to_string(),
                data_fingerprint: data_fingerprint.to_string(),
                value,
                last_used: now,
            },
        );
    }

    /// Drop entries matching every supplied filter; no filter clears everything
    pub fn invalidate(&self, chart_id: Option<&str>, data_fingerprint: Option<&str>) {
        let mut state = self.state.lock();
        if chart_id.is_none() && data_fingerprint.is_none() {
            state.entries.clear();
            state.recency.clear();
            debug!("Chart cache cleared");
            return;
        }

        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| {
                chart_id.map_or(true, |id| e.chart_id == id)
                    && data_fingerprint.map_or(true, |fp| e.data_fingerprint == fp)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        debug!(removed = doomed.len(), "Chart cache invalidated");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            max_size: self.max_size,
        }
    }

    /// Return the cached bytes, or produce them with `render` and cache them.
    /// `render` runs without holding the lock.
    pub fn get_or_insert_with<E>(
        &self,
        chart_id: &str,
        data_fingerprint: &str,
        render: impl FnOnce() -> Result<Vec<u8>, E>,
    ) -> Result<Arc<[u8]>, E> {
        if let Some(hit) = self.get(chart_id, data_fingerprint) {
            return Ok(hit);
        }
        let bytes: Arc<[u8]> = render()?.into();
        self.put(chart_id, data_fingerprint, Arc::clone(&bytes));
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_put_then_get() {
        let cache = ChartCache::new(4);
        cache.put("yield", "fp1", b"png-bytes".to_vec());
        assert_eq!(cache.get("yield", "fp1").as_deref(), Some(&b"png-bytes"[..]));
        assert!(cache.get("yield", "fp2").is_none());
        assert!(cache.get("other", "fp1").is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 2, 1));
    }

    #[test]
    fn test_put_same_key_refreshes_without_growing() {
        let cache = ChartCache::new(2);
        cache.put("a", "x", vec![1]);
        cache.put("b", "x", vec![2]);
        cache.put("a", "x", vec![3]);
        assert_eq!(cache.stats().size, 2);

        // "b" is now the oldest
        cache.put("c", "x", vec![4]);
        assert!(cache.get("b", "x").is_none());
        assert_eq!(cache.get("a", "x").as_deref(), Some(&[3u8][..]));
    }

    #[test]
    fn test_get_promotes_entry() {
        let cache = ChartCache::new(2);
        cache.put("a", "x", vec![1]);
        cache.put("b", "x", vec![2]);
        assert!(cache.get("a", "x").is_some());
        cache.put("c", "x", vec![3]);
        assert!(cache.get("a", "x").is_some());
        assert!(cache.get("b", "x").is_none());
    }

    #[test]
    fn test_invalidate_by_chart_id() {
        let cache = ChartCache::new(10);
        cache.put("yield", "a", vec![1]);
        cache.put("yield", "b", vec![2]);
        cache.put("savings", "a", vec![3]);

        cache.invalidate(Some("yield"), None);
        assert_eq!(cache.stats().size, 1);
        assert!(cache.get("savings", "a").is_some());
    }

    #[test]
    fn test_invalidate_by_fingerprint_and_all() {
        let cache = ChartCache::new(10);
        cache.put("yield", "a", vec![1]);
        cache.put("savings", "a", vec![2]);
        cache.put("savings", "b", vec![3]);

        cache.invalidate(None, Some("a"));
        assert_eq!(cache.stats().size, 1);

        cache.invalidate(None, None);
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_get_or_insert_with_renders_once() {
        let cache = ChartCache::new(10);
        let mut renders = 0;
        for _ in 0..3 {
            let bytes = cache
                .get_or_insert_with("yield", "fp", || {
                    renders += 1;
                    Ok::<_, String>(vec![9, 9])
                })
                .unwrap();
            assert_eq!(&*bytes, &[9, 9]);
        }
        assert_eq!(renders, 1);
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_render_error_is_not_cached() {
        let cache = ChartCache::new(10);
        let result = cache.get_or_insert_with("yield", "fp", || Err::<Vec<u8>, _>("boom"));
        assert_eq!(result.unwrap_err(), "boom");
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_data_fingerprint_ignores_key_order() {
        let a = json!({"year": 2024, "values": [1, 2, 3]});
        let b = json!({"values": [1, 2, 3], "year": 2024});
        assert_eq!(data_fingerprint(&a), data_fingerprint(&b));
        assert_ne!(data_fingerprint(&a), data_fingerprint(&json!({"year": 2025})));
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(ChartCache::new(8));
        std::thread::scope(|scope| {
            for t in 0..4 {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for i in 0..50 {
                        let id = format!("chart-{}", (i + t) % 12);
                        cache.put(&id, "fp", vec![t as u8]);
                        let _ = cache.get(&id, "fp");
                    }
                });
            }
        });
        assert!(cache.stats().size <= 8);
    }

    proptest! {
        /// Property: filling max_size + 1 distinct keys evicts exactly the
        /// least recently accessed key
        #[test]
        fn lru_evicts_least_recent(
            max_size in 1usize..20,
            touched in prop::collection::vec(any::<prop::sample::Index>(), 0..30),
        ) {
            let cache = ChartCache::new(max_size);
            for i in 0..max_size {
                cache.put(&format!("c{}", i), "fp", vec![i as u8]);
            }
            // Replay accesses, tracking the expected recency order
            let mut order: Vec<usize> = (0..max_size).collect();
            for index in touched {
                let i = index.index(max_size);
                let key = format!("c{}", i);
                prop_assert!(cache.get(&key, "fp").is_some());
                order.retain(|&k| k != i);
                order.push(i);
            }

            cache.put("newcomer", "fp", vec![0]);
            let victim = format!("c{}", order[0]);
            prop_assert!(cache.get(&victim, "fp").is_none());
            for &k in &order[1..] {
                let key = format!("c{}", k);
                prop_assert!(cache.get(&key, "fp").is_some());
            }
            prop_assert_eq!(cache.stats().size, max_size);
        }

        /// Property: put then get returns the stored bytes while capacity allows
        #[test]
        fn put_get_roundtrip(
            id in "[a-z]{1,8}",
            fp in "[0-9a-f]{1,16}",
            bytes in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let cache = ChartCache::new(3);
            cache.put(&id, &fp, bytes.clone());
            prop_assert_eq!(cache.get(&id, &fp).map(|b| b.to_vec()), Some(bytes));
        }
    }
}
