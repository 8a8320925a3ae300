//! Background expiry of cold entries

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::manager::CacheManager;
use super::namespace::Namespace;
use super::ttl::TtlCache;

/// A cache that can be swept in independent pieces
pub trait Sweepable: Send + Sync + 'static {
    fn partitions(&self) -> usize;

    /// Expire stale entries of one piece, returning how many went
    fn sweep_partition(&self, index: usize) -> usize;
}

impl Sweepable for CacheManager {
    fn partitions(&self) -> usize {
        Namespace::ALL.len()
    }

    fn sweep_partition(&self, index: usize) -> usize {
        Namespace::ALL
            .get(index)
            .map(|ns| self.sweep_namespace(*ns))
            .unwrap_or(0)
    }
}

impl<V: Clone + Send + 'static> Sweepable for TtlCache<V> {
    fn partitions(&self) -> usize {
        1
    }

    fn sweep_partition(&self, _index: usize) -> usize {
        self.sweep()
    }
}

/// Periodically sweeps a cache on a tokio task.
///
/// Partitions are swept one at a time with a yield in between, so a sweep
/// never holds the runtime for a whole cache. Dropping the sweeper aborts
/// the task.
#[derive(Debug)]
pub struct Sweeper {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn spawn(target: Arc<dyn Sweepable>, every: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = interval.tick() => {}
                }

                let mut removed = 0;
                for index in 0..target.partitions() {
                    removed += target.sweep_partition(index);
                    tokio::task::yield_now().await;
                }
                if removed > 0 {
                    tracing::debug!("Cache sweep removed {} expired entries", removed);
                }
            }
        });

        Self {
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Cache sweeper ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
