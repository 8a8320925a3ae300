//! filedb - a directory-of-JSON record store with an SQL-subset front end
//!
//! Each table is a directory and each record a JSON file in it. Statements
//! in a small SQL dialect are parsed by `filesql` and interpreted against
//! the files. A namespaced TTL cache sits in front for hot lookups.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          FileDb handle                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────┐  ┌──────────────────────────┐  │
//! │  │   Optimizer                 │  │   Cache Manager          │  │
//! │  │   (get_one, get_batch,      │─▶│   (one TTL cache per     │  │
//! │  │    typed lookups, writers)  │  │    namespace, sweeper)   │  │
//! │  └──────────────┬──────────────┘  └──────────────────────────┘  │
//! │                 │                                               │
//! │                 ▼                                               │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                    Query Engine                             ││
//! │  │  filesql parser ─▶ binder ─▶ filter ─▶ executor             ││
//! │  └──────────────────────────┬──────────────────────────────────┘│
//! │                             │                                   │
//! │                             ▼                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                   Record Store                              ││
//! │  │  atomic writes, per-record locks, counters, table scans     ││
//! │  └──────────────────────────┬──────────────────────────────────┘│
//! │                             │                                   │
//! │                             ▼                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │              File System (JSON Files)                       ││
//! │  │  {data_dir}/{table}/{key}.json                              ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod query;
pub mod storage;
pub mod validation;

pub use cache::{CacheManager, CacheStats, Namespace};
pub use config::Config;
pub use error::{Error, Result};
pub use optimizer::{Invalidation, Optimizer, VipStatus};
pub use query::{Params, QueryEngine, QueryResult, WriteSummary};
pub use storage::{Record, RecordStore};

use std::sync::Arc;

use cache::Sweeper;

/// The main database handle.
///
/// Owns the store, the query engine, the cache and the optimizer. Call
/// [`FileDb::init`] to start the background cache sweeps and
/// [`FileDb::shutdown`] to stop them.
#[derive(Debug)]
pub struct FileDb {
    config: Config,
    engine: QueryEngine,
    cache: Arc<CacheManager>,
    optimizer: Optimizer,
    sweepers: Vec<Sweeper>,
}

impl FileDb {
    /// Open or create the database under `config.data_dir`
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store = RecordStore::open(&config).await?;
        let engine = QueryEngine::new(store, &config);
        let cache = Arc::new(CacheManager::new(&config.cache));
        let optimizer = Optimizer::new(engine.clone(), cache.clone(), &config);

        Ok(Self {
            config,
            engine,
            cache,
            optimizer,
            sweepers: Vec::new(),
        })
    }

    /// Start the periodic sweeps. Calling it twice has no further effect.
    pub fn init(&mut self) {
        if !self.sweepers.is_empty() {
            return;
        }

        self.sweepers.push(Sweeper::spawn(self.cache.clone(), self.config.cache.sweep_interval()));
        self.sweepers.push(Sweeper::spawn(
            self.optimizer.file_cache().clone(),
            self.config.optimizer.file_cache_sweep_interval(),
        ));
        tracing::info!("Cache sweeps started for {:?}", self.config.data_dir);
    }

    /// Stop background tasks and wait for them to exit
    pub async fn shutdown(&mut self) {
        for sweeper in self.sweepers.drain(..) {
            sweeper.shutdown().await;
        }
        tracing::info!("Cache sweeps stopped");
    }

    /// Execute one statement
    pub async fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<QueryResult> {
        self.engine.execute(sql, params).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        self.engine.store()
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }
}
