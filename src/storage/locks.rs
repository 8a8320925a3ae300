//! Per-record write serialization
//!
//! Every read-modify-write of one record runs under that record's lock.
//! Locks are process-local; a second process writing the same data
//! directory is not coordinated with.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map of `table/key` to an async mutex, pruned as guards are released
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one record
    pub async fn lock(&self, table: &str, key: &str) -> KeyGuard<'_> {
        let name = format!("{}/{}", table, key);
        let lock = {
            let mut locks = self.locks.lock();
            locks.entry(name.clone()).or_default().clone()
        };

        KeyGuard {
            locks: self,
            name,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of records currently locked or waited on
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while one record is being rewritten
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only reference when nobody waits
        self.guard.take();

        let mut locks = self.locks.locks.lock();
        if locks.get(&self.name).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.name);
        }
    }
}
