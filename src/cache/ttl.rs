//! Bounded map with per-entry expiry

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Share of entries dropped when a cache outgrows its bound
const EVICTION_PERCENT: usize = 20;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
    // Tie-break for entries stored within the same clock tick
    seq: u64,
}

/// Hit, miss and eviction totals since creation or the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// A TTL cache holding at most `max_entries` values.
///
/// An entry is visible while its age is below the TTL. Once the bound is
/// exceeded the oldest fifth of the entries is dropped.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, Entry<V>>>,
    seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`. An expired entry is removed on the way.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let entry = Entry {
            value,
            stored_at: Instant::now(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = self.entries.lock();
        entries.insert(key.into(), entry);

        if entries.len() > self.max_entries {
            let evicted = evict_oldest(&mut entries, self.eviction_batch());
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!("Cache over {} entries, evicted {}", self.max_entries, evicted);
        }
    }

    /// Drop one entry; returns whether it was present
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Remove every expired entry, returning how many went
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);

        let removed = before - entries.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> Counters {
        Counters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    fn eviction_batch(&self) -> usize {
        (self.max_entries * EVICTION_PERCENT / 100).max(1)
    }
}

fn evict_oldest<V>(entries: &mut HashMap<String, Entry<V>>, count: usize) -> usize {
    let mut by_age: Vec<(Instant, u64, String)> = entries
        .iter()
        .map(|(key, entry)| (entry.stored_at, entry.seq, key.clone()))
        .collect();
    by_age.sort_unstable();

    by_age
        .into_iter()
        .take(count)
        .filter(|(_, _, key)| entries.remove(key).is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_counts_one_eviction() {
        let cache = TtlCache::new(Duration::from_millis(300_000), 10);
        cache.set("100_42", 3);
        assert_eq!(cache.get("100_42"), Some(3));

        tokio::time::advance(Duration::from_millis(300_001)).await;
        assert_eq!(cache.get("100_42"), None);
        assert_eq!(cache.counters(), Counters { hits: 1, misses: 1, evictions: 1 });
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_at_exactly_ttl() {
        let cache = TtlCache::new(Duration::from_secs(10), 10);
        cache.set("k", "v");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_oldest_fifth() {
        let cache = TtlCache::new(Duration::from_secs(60), 10);
        for i in 0..10 {
            cache.set(format!("k{}", i), i);
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.len(), 10);

        cache.set("k10", 10);
        assert_eq!(cache.len(), 9);
        assert_eq!(cache.counters().evictions, 2);
        assert_eq!(cache.get("k0"), None);
        assert_eq!(cache.get("k1"), None);
        assert_eq!(cache.get("k2"), Some(2));
        assert_eq!(cache.get("k10"), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_instant_evicts_by_insertion_order() {
        let cache = TtlCache::new(Duration::from_secs(60), 3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        cache.set("d", 4);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_only() {
        let cache = TtlCache::new(Duration::from_secs(5), 10);
        cache.set("old", 1);
        tokio::time::advance(Duration::from_secs(3)).await;
        cache.set("new", 2);
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.get("new"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_reset() {
        let cache = TtlCache::new(Duration::from_secs(5), 10);
        cache.set("a", 1);
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.get("a"), None);

        cache.reset_counters();
        assert_eq!(cache.counters(), Counters::default());
    }
}
