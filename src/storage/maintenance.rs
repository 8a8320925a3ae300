//! Offline maintenance of a data directory

use std::path::PathBuf;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::storage::record::is_blank;

/// Outcome of [`cleanup`]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CleanupReport {
    /// `.json` files examined
    pub scanned: usize,
    /// Empty or whitespace-only files that were deleted
    pub removed: Vec<PathBuf>,
    /// Files holding invalid JSON, left in place for inspection
    pub invalid: Vec<PathBuf>,
}

/// Walk `root` recursively, deleting empty record files and reporting
/// corrupt ones.
pub async fn cleanup(root: PathBuf) -> Result<CleanupReport> {
    tokio::task::spawn_blocking(move || cleanup_blocking(&root)).await?
}

fn cleanup_blocking(root: &std::path::Path) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    if !root.exists() {
        return Ok(report);
    }

    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        report.scanned += 1;

        let content = std::fs::read(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        if is_blank(&content) {
            std::fs::remove_file(path).map_err(|source| Error::FileDelete {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!("Removed empty record file {:?}", path);
            report.removed.push(path.to_path_buf());
        } else if serde_json::from_slice::<serde_json::Value>(&content).is_err() {
            tracing::warn!("Invalid JSON in {:?}, left in place", path);
            report.invalid.push(path.to_path_buf());
        }
    }

    report.removed.sort();
    report.invalid.sort();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cleanup_removes_empty_and_reports_invalid() {
        let tmp = TempDir::new().unwrap();
        let roles = tmp.path().join("roles_1");
        let nested = tmp.path().join("archive").join("2024");
        std::fs::create_dir_all(&roles).unwrap();
        std::fs::create_dir_all(&nested).unwrap();

        std::fs::write(roles.join("1.json"), "{\"user_id\": 1}").unwrap();
        std::fs::write(roles.join("2.json"), "   \n").unwrap();
        std::fs::write(nested.join("3.json"), "").unwrap();
        std::fs::write(roles.join("4.json"), "{oops").unwrap();
        std::fs::write(roles.join("5.json"), [0xff, 0xfe, b'{', b'}']).unwrap();
        std::fs::write(roles.join("readme.txt"), "").unwrap();

        let report = cleanup(tmp.path().to_path_buf()).await.unwrap();
        assert_eq!(report.scanned, 5);
        assert_eq!(report.removed, vec![nested.join("3.json"), roles.join("2.json")]);
        assert_eq!(report.invalid, vec![roles.join("4.json"), roles.join("5.json")]);

        assert!(roles.join("1.json").exists());
        assert!(!roles.join("2.json").exists());
        assert!(roles.join("4.json").exists());
        assert!(roles.join("readme.txt").exists());
    }

    #[tokio::test]
    async fn test_cleanup_missing_root() {
        let tmp = TempDir::new().unwrap();
        let report = cleanup(tmp.path().join("absent")).await.unwrap();
        assert_eq!(report, CleanupReport::default());
    }
}
