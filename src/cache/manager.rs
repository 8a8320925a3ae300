//! One TTL cache per namespace

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::namespace::{CacheKey, Namespace};
use super::ttl::{Counters, TtlCache};
use crate::config::CacheConfig;

/// In-memory accelerator in front of the record store.
///
/// Entries are JSON values. The store stays the source of truth: an empty
/// manager only makes reads slower.
#[derive(Debug)]
pub struct CacheManager {
    caches: HashMap<Namespace, TtlCache<Value>>,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        let caches = Namespace::ALL
            .into_iter()
            .map(|ns| (ns, TtlCache::new(config.ttl(ns), config.max_entries)))
            .collect();
        Self { caches }
    }

    fn cache(&self, ns: Namespace) -> &TtlCache<Value> {
        // Every namespace is populated in `new`
        &self.caches[&ns]
    }

    pub fn get(&self, ns: Namespace, key: impl CacheKey) -> Option<Value> {
        self.cache(ns).get(&key.cache_key())
    }

    pub fn set(&self, ns: Namespace, key: impl CacheKey, value: Value) {
        self.cache(ns).set(key.cache_key(), value);
    }

    pub fn invalidate(&self, ns: Namespace, key: impl CacheKey) {
        let key = key.cache_key();
        if self.cache(ns).invalidate(&key) {
            tracing::debug!("Invalidated {}/{}", ns, key);
        }
    }

    /// Clear a whole namespace
    pub fn invalidate_all(&self, ns: Namespace) {
        self.cache(ns).clear();
        tracing::debug!("Invalidated all of {}", ns);
    }

    /// Expire stale entries of one namespace
    pub fn sweep_namespace(&self, ns: Namespace) -> usize {
        self.cache(ns).sweep()
    }

    /// Expire stale entries everywhere
    pub fn sweep(&self) -> usize {
        Namespace::ALL.into_iter().map(|ns| self.sweep_namespace(ns)).sum()
    }

    pub fn stats(&self) -> CacheStats {
        let mut totals = Counters::default();
        let mut per_namespace = BTreeMap::new();

        for ns in Namespace::ALL {
            let cache = self.cache(ns);
            let counters = cache.counters();
            totals.hits += counters.hits;
            totals.misses += counters.misses;
            totals.evictions += counters.evictions;
            per_namespace.insert(ns, cache.len());
        }

        let lookups = totals.hits + totals.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            totals.hits as f64 / lookups as f64
        };

        CacheStats {
            hits: totals.hits,
            misses: totals.misses,
            evictions: totals.evictions,
            hit_rate,
            total_size: per_namespace.values().sum(),
            per_namespace,
        }
    }

    /// Drop every entry and zero the counters
    pub fn reset(&self) {
        for cache in self.caches.values() {
            cache.clear();
            cache.reset_counters();
        }
        tracing::info!("Cache reset");
    }
}

/// Snapshot of cache counters and sizes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// `hits / (hits + misses)`, 0 when nothing was looked up
    pub hit_rate: f64,
    pub per_namespace: BTreeMap<Namespace, usize>,
    pub total_size: usize,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "hits: {}, misses: {}, evictions: {}, hit rate: {:.2}%",
            self.hits,
            self.misses,
            self.evictions,
            self.hit_rate * 100.0
        )?;
        for (ns, size) in &self.per_namespace {
            writeln!(f, "  {}: {}", ns, size)?;
        }
        write!(f, "total: {}", self.total_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn manager() -> CacheManager {
        CacheManager::new(&CacheConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_namespaces_have_independent_ttls() {
        let cache = manager();
        cache.set(Namespace::BanLists, 100, json!([1, 2]));
        cache.set(Namespace::UserRoles, (100, 42), json!(3));

        tokio::time::advance(Duration::from_secs(150)).await;
        assert_eq!(cache.get(Namespace::BanLists, 100), None);
        assert_eq!(cache.get(Namespace::UserRoles, "100_42"), Some(json!(3)));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 1));
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = manager();
        cache.set(Namespace::ChatSettings, 1, json!({"spam": 1}));
        cache.set(Namespace::ChatSettings, 2, json!({"spam": 0}));

        cache.invalidate(Namespace::ChatSettings, 1);
        assert_eq!(cache.get(Namespace::ChatSettings, 1), None);
        assert!(cache.get(Namespace::ChatSettings, 2).is_some());

        cache.invalidate_all(Namespace::ChatSettings);
        assert_eq!(cache.stats().per_namespace[&Namespace::ChatSettings], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_and_reset() {
        let cache = manager();
        cache.set(Namespace::UserStats, "a", json!(1));
        cache.set(Namespace::Marriages, "b", json!(2));

        tokio::time::advance(Namespace::UserStats.default_ttl()).await;
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.stats().total_size, 1);

        cache.reset();
        let stats = cache.stats();
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_ttl_override() {
        let mut config = CacheConfig::default();
        config.ttl_ms.insert(Namespace::UserRoles, 1_000);
        let cache = CacheManager::new(&config);
        assert_eq!(cache.cache(Namespace::UserRoles).ttl(), Duration::from_secs(1));
        assert_eq!(cache.cache(Namespace::VkUsers).ttl(), Duration::from_secs(1800));
    }
}
