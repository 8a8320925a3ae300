//! Batched cache-first lookups

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::Optimizer;
use crate::cache::{CacheKey, Namespace};
use crate::error::{Error, Result};

impl Optimizer {
    /// Look up many keys at once.
    ///
    /// Cached keys are answered from the cache; the rest are loaded
    /// concurrently, at most `batch_concurrency` at a time, and cached.
    /// Duplicate keys are loaded once. The first loader error is returned.
    pub async fn get_batch<K, F, Fut>(&self, ns: Namespace, keys: Vec<K>, loader: F) -> Result<HashMap<K, Value>>
    where
        K: CacheKey + Eq + Hash + Clone + Send + 'static,
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut found = HashMap::with_capacity(keys.len());
        let mut missing = Vec::new();

        for key in keys {
            if found.contains_key(&key) || missing.contains(&key) {
                continue;
            }
            match self.cache.get(ns, key.cache_key()) {
                Some(value) => {
                    found.insert(key, value);
                }
                None => missing.push(key),
            }
        }

        if missing.is_empty() {
            return Ok(found);
        }
        tracing::debug!("{} batch: {} cached, {} to load", ns, found.len(), missing.len());

        let loader = Arc::new(loader);
        let permits = Arc::new(Semaphore::new(self.batch_concurrency));
        let mut tasks = JoinSet::new();

        for key in missing {
            let loader = loader.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| Error::Task {
                    message: e.to_string(),
                })?;
                let value = loader(key.clone()).await?;
                Ok::<_, Error>((key, value))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (key, value) = joined??;
            self.cache.set(ns, key.cache_key(), value.clone());
            found.insert(key, value);
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::optimizer;
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[tokio::test]
    async fn test_loader_called_only_for_uncached_keys() {
        let (_tmp, opt) = optimizer();
        opt.cache().set(Namespace::VkUsers, 1i64, json!({"name": "cached"}));

        let loaded = Arc::new(Mutex::new(Vec::new()));
        let seen = loaded.clone();
        let result = opt
            .get_batch(Namespace::VkUsers, vec![1i64, 2, 3, 2], move |id| {
                let seen = seen.clone();
                async move {
                    seen.lock().push(id);
                    Ok(json!({"name": format!("user{}", id)}))
                }
            })
            .await
            .unwrap();

        let mut loaded = loaded.lock().clone();
        loaded.sort();
        assert_eq!(loaded, vec![2, 3]);

        assert_eq!(result.len(), 3);
        assert_eq!(result[&1]["name"], "cached");
        assert_eq!(result[&3]["name"], "user3");
        assert_eq!(opt.cache().get(Namespace::VkUsers, 2i64), Some(json!({"name": "user2"})));
    }

    #[tokio::test]
    async fn test_loader_error_propagates() {
        let (_tmp, opt) = optimizer();

        let result = opt
            .get_batch(Namespace::VkUsers, vec![1i64, 2], |id| async move {
                if id == 2 {
                    Err(Error::Other("unreachable".into()))
                } else {
                    Ok(json!(id))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(opt.cache().get(Namespace::VkUsers, 2i64), None);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_tmp, opt) = optimizer();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (active.clone(), peak.clone());
        let keys: Vec<i64> = (0..50).collect();
        let result = opt
            .get_batch(Namespace::UserStats, keys, move |id| {
                let (a, p) = (a.clone(), p.clone());
                async move {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    a.fetch_sub(1, Ordering::SeqCst);
                    Ok(json!(id))
                }
            })
            .await
            .unwrap();

        assert_eq!(result.len(), 50);
        assert!(peak.load(Ordering::SeqCst) <= 10);
    }
}
