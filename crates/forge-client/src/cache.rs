//! Bounded in-memory response cache
//!
//! Memoizes read responses keyed by request fingerprint. Two policies bound
//! it: a per-entry TTL (supplied at insert time, so rate-limit metadata and
//! search results can carry different lifetimes) and a max-size LRU bound.
//!
//! Recency is tracked with sequence-stamped markers in a queue next to the
//! map. Every get/insert pushes a fresh marker and records its sequence on
//! the entry; eviction pops markers from the front and skips stale ones
//! (whose sequence no longer matches the live entry). Each marker is pushed
//! once and popped once, so get, insert, and evict are O(1) amortized.
//!
//! The cache is never required for correctness: with `max_size == 0` every
//! lookup misses and inserts are dropped, and callers behave identically,
//! only slower.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Cache counters. `hits`/`misses` are monotonic and reset only by `clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
}

#[derive(Debug)]
struct CacheEntry {
    value: String,
    stored_at: Instant,
    ttl: Duration,
    /// Sequence of this entry's newest recency marker.
    seq: u64,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    recency: VecDeque<(u64, String)>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    max_size: usize,
}

impl CacheInner {
    fn new(max_size: usize) -> Self {
        Self {
            map: HashMap::new(),
            recency: VecDeque::new(),
            next_seq: 0,
            hits: 0,
            misses: 0,
            max_size,
        }
    }

    fn stamp(&mut self, key: &str) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.recency.push_back((seq, key.to_string()));
        seq
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let expired = match self.map.get(key) {
            Some(entry) => entry.stored_at.elapsed() >= entry.ttl,
            None => {
                self.misses += 1;
                return None;
            }
        };
        if expired {
            // Expired entries are removed on lookup and count as misses.
            self.map.remove(key);
            self.misses += 1;
            return None;
        }

        let seq = self.stamp(key);
        if let Some(entry) = self.map.get_mut(key) {
            entry.seq = seq;
            self.hits += 1;
            return Some(entry.value.clone());
        }
        self.misses += 1;
        None
    }

    fn insert(&mut self, key: String, value: String, ttl: Duration) {
        if self.max_size == 0 {
            return;
        }
        let seq = self.stamp(&key);
        self.map.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                seq,
            },
        );
        // The newest entry holds the highest sequence, so it can never be
        // the eviction victim while anything else remains.
        while self.map.len() > self.max_size && self.evict_lru() {}
    }

    /// Pop recency markers until one matches a live entry, then evict it.
    /// Returns false only when no marker is left to pop.
    fn evict_lru(&mut self) -> bool {
        while let Some((seq, key)) = self.recency.pop_front() {
            let live = self.map.get(&key).is_some_and(|entry| entry.seq == seq);
            if live {
                self.map.remove(&key);
                return true;
            }
        }
        false
    }

    fn clear(&mut self) {
        self.map.clear();
        self.recency.clear();
        self.hits = 0;
        self.misses = 0;
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.map.len(),
            max_size: self.max_size,
        }
    }
}

/// Thread-safe bounded response cache.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    /// Cache holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::new(max_size)),
        }
    }

    /// Cache that stores nothing and always misses.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Fetch a non-expired value, refreshing its recency.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().await.get(key)
    }

    /// Store a value with its own TTL, evicting least-recently-used entries
    /// if the bound would be exceeded.
    pub async fn insert(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.inner.lock().await.insert(key.into(), value.into(), ttl);
    }

    /// Drop every entry and reset the hit/miss counters.
    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn basic_get_and_insert() {
        let cache = ResponseCache::new(4);

        assert!(cache.get("k1").await.is_none());
        cache.insert("k1", "v1", TTL).await;
        assert_eq!(cache.get("k1").await.as_deref(), Some("v1"));

        cache.insert("k1", "v2", TTL).await;
        assert_eq!(cache.get("k1").await.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn size_never_exceeds_bound() {
        let cache = ResponseCache::new(3);
        for i in 0..20 {
            cache.insert(format!("k{i}"), "v", TTL).await;
            assert!(
                cache.stats().await.size <= 3,
                "size bound violated at insert {i}"
            );
        }
    }

    #[tokio::test]
    async fn oldest_by_recency_is_evicted_first() {
        let cache = ResponseCache::new(2);
        cache.insert("a", "1", TTL).await;
        cache.insert("b", "2", TTL).await;

        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a").await.is_some());

        cache.insert("c", "3", TTL).await;

        assert!(cache.get("a").await.is_some(), "recently used entry evicted");
        assert!(cache.get("b").await.is_none(), "LRU entry must be evicted");
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn insert_a_b_c_at_capacity_two_evicts_a() {
        let cache = ResponseCache::new(2);
        cache.insert("a", "1", TTL).await;
        cache.insert("b", "2", TTL).await;
        cache.insert("c", "3", TTL).await;

        let stats = cache.stats().await;
        assert_eq!(stats.size, 2);
        assert!(cache.get("a").await.is_none(), "a must be evicted");
        assert!(cache.get("b").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn entries_expire_per_entry() {
        let cache = ResponseCache::new(4);
        cache.insert("short", "x", Duration::from_millis(30)).await;
        cache.insert("long", "y", TTL).await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.get("short").await.is_none(), "short TTL must expire");
        assert!(cache.get("long").await.is_some(), "long TTL must survive");
    }

    #[tokio::test]
    async fn expired_lookup_counts_as_miss_and_removes() {
        let cache = ResponseCache::new(4);
        cache.insert("k", "v", Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert!(cache.get("k").await.is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.size, 0, "expired entry must be removed on lookup");
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = ResponseCache::new(4);
        cache.insert("k", "v", TTL).await;

        assert!(cache.get("k").await.is_some());
        assert!(cache.get("k").await.is_some());
        assert!(cache.get("absent").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 4);
    }

    #[tokio::test]
    async fn clear_empties_and_resets_counters() {
        let cache = ResponseCache::new(4);
        cache.insert("k", "v", TTL).await;
        let _ = cache.get("k").await;
        let _ = cache.get("absent").await;

        cache.clear().await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 0);
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let cache = ResponseCache::disabled();
        cache.insert("k", "v", TTL).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().await.size, 0);
    }

    #[tokio::test]
    async fn reinserted_key_does_not_inflate_size() {
        let cache = ResponseCache::new(2);
        for _ in 0..10 {
            cache.insert("same", "v", TTL).await;
        }
        cache.insert("other", "w", TTL).await;

        let stats = cache.stats().await;
        assert_eq!(stats.size, 2);
        assert!(cache.get("same").await.is_some());
        assert!(cache.get("other").await.is_some());
    }

    #[tokio::test]
    async fn eviction_skips_stale_recency_markers() {
        let cache = ResponseCache::new(2);
        cache.insert("a", "1", TTL).await;
        cache.insert("b", "2", TTL).await;
        // Pile up stale markers for "a".
        for _ in 0..5 {
            let _ = cache.get("a").await;
        }
        cache.insert("c", "3", TTL).await;

        // "b" is LRU despite "a" owning most of the marker queue.
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
    }
}
