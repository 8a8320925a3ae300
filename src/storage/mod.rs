//! Storage layer for filedb
//!
//! A table is a directory under the data root and a record is one
//! `<key>.json` file inside it.
//!
//! Directory structure:
//! ```text
//! data/
//!   roles_100/
//!     42.json
//!   tickets/
//!     last_id.json
//!     1.json
//!     2.json
//! ```

pub mod identity;
pub mod locks;
pub mod maintenance;
pub mod record;
pub mod table;

pub use identity::{Identity, IdentityRules};
pub use locks::{KeyGuard, KeyLocks};
pub use maintenance::CleanupReport;
pub use record::{parse_json_column, Record};
pub use table::TableScan;

use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::validation::{validate_record_key, validate_table_name};

/// File stem of the auto-increment counter record
pub const COUNTER_KEY: &str = "last_id";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Handle to a data directory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RecordStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    root: PathBuf,
    auto_increment: HashSet<String>,
    locks: KeyLocks,
}

impl RecordStore {
    /// Handle rooted at `root` without touching the filesystem
    pub fn new(root: impl Into<PathBuf>, auto_increment: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                root: root.into(),
                auto_increment: auto_increment.into_iter().collect(),
                locks: KeyLocks::new(),
            }),
        }
    }

    /// Open the configured data directory, creating it and its tables
    pub async fn open(config: &Config) -> Result<Self> {
        let store = Self::new(&config.data_dir, config.auto_increment_tables.iter().cloned());
        create_dir(store.root()).await?;
        for table in &config.tables {
            store.ensure_table(table).await?;
        }
        tracing::info!(
            "Opened record store at {:?} ({} tables)",
            store.root(),
            config.tables.len()
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn is_auto_increment(&self, table: &str) -> bool {
        self.inner.auto_increment.contains(table)
    }

    /// Directory backing `table`
    pub fn table_path(&self, table: &str) -> Result<PathBuf> {
        validate_table_name(table)?;
        Ok(self.inner.root.join(table))
    }

    fn record_path(&self, table: &str, key: &str) -> Result<PathBuf> {
        validate_record_key(key)?;
        Ok(self.table_path(table)?.join(format!("{}.json", key)))
    }

    /// Create the table directory; no error if it already exists
    pub async fn ensure_table(&self, table: &str) -> Result<()> {
        create_dir(&self.table_path(table)?).await
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let path = self.table_path(table)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    /// Write `record` at `table/key.json`, replacing any existing content
    pub async fn put(&self, table: &str, key: &str, record: &Record) -> Result<()> {
        let path = self.record_path(table, key)?;
        self.ensure_table(table).await?;
        let content = record::encode(record)?;

        // Write a sibling temp file then rename, so readers never see a torn record
        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, content).await.map_err(|source| Error::FileWrite {
            path: tmp.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&tmp, &path).await {
            if let Err(e) = fs::remove_file(&tmp).await {
                tracing::warn!("Could not remove temp file {:?}: {}", tmp, e);
            }
            return Err(Error::FileWrite { path, source });
        }
        Ok(())
    }

    /// Store `record` under a fresh millisecond-timestamp key and return it.
    ///
    /// The timestamp is bumped until an unused file name is claimed.
    pub async fn put_generated(&self, table: &str, record: &Record) -> Result<String> {
        let dir = self.table_path(table)?;
        self.ensure_table(table).await?;
        let content = record::encode(record)?;

        let mut stamp = chrono::Utc::now().timestamp_millis();
        loop {
            let key = stamp.to_string();
            let path = dir.join(format!("{}.json", key));
            match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(content.as_bytes()).await?;
                        file.flush().await
                    };
                    written.await.map_err(|source| Error::FileWrite { path, source })?;
                    return Ok(key);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => stamp += 1,
                Err(source) => return Err(Error::FileWrite { path, source }),
            }
        }
    }

    /// Read one record. Missing, empty and corrupt files are `None`.
    pub async fn get(&self, table: &str, key: &str) -> Result<Option<Record>> {
        let path = self.record_path(table, key)?;
        match fs::read(&path).await {
            Ok(content) => Ok(record::decode(&path, &content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::FileRead { path, source }),
        }
    }

    /// Lazily enumerate `(key, record)` pairs; a missing table is empty
    pub fn scan(&self, table: &str) -> Result<TableScan> {
        let dir = self.table_path(table)?;
        Ok(TableScan::new(dir, self.is_auto_increment(table)))
    }

    /// All readable records of a table
    pub async fn list(&self, table: &str) -> Result<Vec<Record>> {
        let rows = self.scan(table)?.collect().await?;
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }

    /// Delete a record. Returns whether a file was removed.
    pub async fn remove(&self, table: &str, key: &str) -> Result<bool> {
        let path = self.record_path(table, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(Error::FileDelete { path, source }),
        }
    }

    /// Names of all table directories, sorted
    pub async fn tables(&self) -> Result<Vec<String>> {
        let root = self.root();
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(Error::DirRead {
                    path: root.to_path_buf(),
                    source,
                })
            }
        };

        let mut tables = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| Error::DirRead {
            path: root.to_path_buf(),
            source,
        })? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                tables.push(name.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }

    /// Take the next auto-increment id for `table`, persisting it
    pub async fn next_id(&self, table: &str) -> Result<i64> {
        let _guard = self.lock(table, COUNTER_KEY).await;

        let last = self
            .get(table, COUNTER_KEY)
            .await?
            .and_then(|counter| counter.get(COUNTER_KEY).and_then(Value::as_i64))
            .unwrap_or(0);
        let next = last + 1;

        let mut counter = Record::new();
        counter.insert(COUNTER_KEY.to_string(), Value::from(next));
        self.put(table, COUNTER_KEY, &counter).await?;
        Ok(next)
    }

    /// Serialize read-modify-write access to one record
    pub async fn lock(&self, table: &str, key: &str) -> KeyGuard<'_> {
        self.inner.locks.lock(table, key).await
    }

    /// Delete empty record files and report corrupt ones
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        maintenance::cleanup(self.root().to_path_buf()).await
    }
}

async fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await.map_err(|source| Error::DirCreate {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> RecordStore {
        RecordStore::new(tmp.path(), vec!["tickets".to_string()])
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_record_crud() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let rec = record(json!({"user_id": 42, "role_id": 80, "tags": ["a"], "meta": {"x": null}}));

        // Create
        store.put("roles_100", "42", &rec).await.unwrap();
        let text = std::fs::read_to_string(tmp.path().join("roles_100/42.json")).unwrap();
        assert!(text.starts_with("{\n  \"user_id\": 42"));

        // Read
        assert_eq!(store.get("roles_100", "42").await.unwrap(), Some(rec.clone()));

        // List
        assert_eq!(store.list("roles_100").await.unwrap(), vec![rec]);

        // Delete
        assert!(store.remove("roles_100", "42").await.unwrap());
        assert!(!store.remove("roles_100", "42").await.unwrap());
        assert!(store.get("roles_100", "42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_table_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        assert!(store.list("nope").await.unwrap().is_empty());
        assert!(store.get("nope", "1").await.unwrap().is_none());
        assert!(!store.table_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_skips_bad_files() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.put("t", "1", &record(json!({"id": 1}))).await.unwrap();

        let dir = tmp.path().join("t");
        std::fs::write(dir.join("2.json"), "").unwrap();
        std::fs::write(dir.join("3.json"), "{broken").unwrap();
        std::fs::write(dir.join("notes.txt"), "{}").unwrap();

        let rows = store.list("t").await.unwrap();
        assert_eq!(rows, vec![record(json!({"id": 1}))]);
        assert!(store.get("t", "2").await.unwrap().is_none());
        assert!(store.get("t", "3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_utf8_record_is_absent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.put("t", "1", &record(json!({"id": 1}))).await.unwrap();
        std::fs::write(tmp.path().join("t").join("2.json"), [0xff, 0xfe, b'{', b'}']).unwrap();

        assert_eq!(store.list("t").await.unwrap(), vec![record(json!({"id": 1}))]);
        assert!(store.get("t", "2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        // A directory where the record file should go makes the rename fail
        std::fs::create_dir_all(tmp.path().join("t").join("1.json").join("inner")).unwrap();

        let result = store.put("t", "1", &record(json!({"id": 1}))).await;
        assert!(matches!(result, Err(Error::FileWrite { .. })));

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("t"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_validated() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let rec = record(json!({"id": 1}));
        assert!(matches!(
            store.put("t", "../escape", &rec).await,
            Err(Error::InvalidIdentifier { .. })
        ));
        assert!(store.put("../t", "1", &rec).await.is_err());
    }

    #[tokio::test]
    async fn test_next_id_and_counter_hidden_from_scan() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        assert_eq!(store.next_id("tickets").await.unwrap(), 1);
        assert_eq!(store.next_id("tickets").await.unwrap(), 2);

        let counter = std::fs::read_to_string(tmp.path().join("tickets/last_id.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&counter).unwrap(), json!({"last_id": 2}));
        assert!(store.list("tickets").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_generated_never_collides() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let rec = record(json!({"text": "hi"}));

        let a = store.put_generated("logs", &rec).await.unwrap();
        let b = store.put_generated("logs", &rec).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list("logs").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tables_sorted() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.ensure_table("b").await.unwrap();
        store.ensure_table("a").await.unwrap();
        store.ensure_table("a").await.unwrap();
        std::fs::write(tmp.path().join("stray.json"), "{}").unwrap();

        assert_eq!(store.tables().await.unwrap(), vec!["a", "b"]);
    }
}
