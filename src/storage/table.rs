//! Lazy enumeration of the records in one table directory

use std::path::PathBuf;
use tokio::fs;

use crate::error::{Error, Result};
use crate::storage::record::{self, Record};
use crate::storage::COUNTER_KEY;
use crate::validation::validate_record_key;

/// Streams `(key, record)` pairs from a table directory.
///
/// Order follows the directory listing and is not stable. Files that are
/// empty, corrupt, or vanish mid-scan are skipped.
#[derive(Debug)]
pub struct TableScan {
    dir: PathBuf,
    entries: Option<fs::ReadDir>,
    skip_counter: bool,
    started: bool,
}

impl TableScan {
    pub(crate) fn new(dir: PathBuf, skip_counter: bool) -> Self {
        Self {
            dir,
            entries: None,
            skip_counter,
            started: false,
        }
    }

    /// Next readable record, or `None` when the table is exhausted
    pub async fn next(&mut self) -> Result<Option<(String, Record)>> {
        if !self.started {
            self.started = true;
            self.entries = match fs::read_dir(&self.dir).await {
                Ok(entries) => Some(entries),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(source) => {
                    return Err(Error::DirRead {
                        path: self.dir.clone(),
                        source,
                    })
                }
            };
        }

        let Some(entries) = self.entries.as_mut() else {
            return Ok(None);
        };

        loop {
            let entry = entries.next_entry().await.map_err(|source| Error::DirRead {
                path: self.dir.clone(),
                source,
            })?;
            let Some(entry) = entry else {
                return Ok(None);
            };

            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            if self.skip_counter && key == COUNTER_KEY {
                continue;
            }
            if validate_record_key(&key).is_err() {
                tracing::debug!("Skipping {:?}: file name is not a record key", path);
                continue;
            }

            let content = match fs::read(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(Error::FileRead { path, source }),
            };

            if let Some(record) = record::decode(&path, &content) {
                return Ok(Some((key, record)));
            }
        }
    }

    /// Drain the scan into a vector
    pub async fn collect(mut self) -> Result<Vec<(String, Record)>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}
