//! Cache-first lookups over the query engine
//!
//! Reads check the [`CacheManager`] first and fall back to a loader that
//! goes through the store. Writes go through [`Optimizer::execute_write`]
//! (or one of the typed writers) which invalidate the affected entries in
//! both the namespace cache and the file cache before returning.

mod batch;
mod entities;

pub use entities::{VipStatus, DEFAULT_CHAT_SETTINGS};

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::cache::{CacheKey, CacheManager, Namespace, TtlCache};
use crate::config::Config;
use crate::error::Result;
use crate::query::{Params, QueryEngine, QueryResult};

/// One cache entry a write makes stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub namespace: Namespace,
    pub key: String,
}

impl Invalidation {
    pub fn new(namespace: Namespace, key: impl CacheKey) -> Self {
        Self {
            namespace,
            key: key.cache_key(),
        }
    }

    /// File-cache entry holding the raw record behind this entry, if any
    pub fn file_key(&self) -> Option<String> {
        match self.namespace {
            Namespace::UserRoles => Some(format!("role_{}", self.key)),
            Namespace::ChatSettings => Some(format!("settings_{}", self.key)),
            _ => None,
        }
    }
}

/// Cache-first facade. Cheap to clone; clones share caches.
#[derive(Debug, Clone)]
pub struct Optimizer {
    engine: QueryEngine,
    cache: Arc<CacheManager>,
    /// Short-lived copies of raw records, in front of direct store reads
    file_cache: Arc<TtlCache<Value>>,
    batch_concurrency: usize,
}

impl Optimizer {
    pub fn new(engine: QueryEngine, cache: Arc<CacheManager>, config: &Config) -> Self {
        let file_cache = TtlCache::new(config.optimizer.file_cache_ttl(), config.cache.max_entries);
        Self {
            engine,
            cache,
            file_cache: Arc::new(file_cache),
            batch_concurrency: config.optimizer.batch_concurrency.max(1),
        }
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn file_cache(&self) -> &Arc<TtlCache<Value>> {
        &self.file_cache
    }

    /// Cached value for `key`, loading and caching it on a miss.
    ///
    /// Whatever the loader returns is cached, including defaults for
    /// missing records. Loader errors are returned and nothing is cached.
    pub async fn get_one<K, F, Fut>(&self, ns: Namespace, key: K, loader: F) -> Result<Value>
    where
        K: CacheKey,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let key = key.cache_key();
        if let Some(value) = self.cache.get(ns, key.as_str()) {
            return Ok(value);
        }

        let value = loader().await?;
        self.cache.set(ns, key, value.clone());
        Ok(value)
    }

    /// Run a write and invalidate the entries it affects.
    ///
    /// Nothing is invalidated if the write fails.
    pub async fn execute_write(
        &self,
        sql: &str,
        params: impl Into<Params>,
        invalidations: &[Invalidation],
    ) -> Result<QueryResult> {
        let result = self.engine.execute(sql, params).await?;
        for inv in invalidations {
            self.invalidate(inv);
        }
        Ok(result)
    }

    /// Drop one entry from the namespace cache and its raw record from the file cache
    pub fn invalidate(&self, inv: &Invalidation) {
        self.cache.invalidate(inv.namespace, inv.key.as_str());
        if let Some(file_key) = inv.file_key() {
            self.file_cache.invalidate(&file_key);
        }
    }

    /// Raw record through the file cache; `None` if absent.
    async fn cached_record(&self, file_key: &str, table: &str, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.file_cache.get(file_key) {
            return Ok(Some(value));
        }

        let record = self.engine.store().get(table, key).await?;
        Ok(record.map(|record| {
            let value = Value::Object(record);
            self.file_cache.set(file_key, value.clone());
            value
        }))
    }
}
