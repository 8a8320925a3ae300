//! Configuration for a filedb instance
//!
//! Loaded from YAML. Every key is optional; missing keys take the defaults
//! below.
//!
//! ```yaml
//! data_dir: ./data
//! auto_increment_tables: [tickets]
//! primary_keys:
//!   vip_users: user_id
//! cache:
//!   max_entries: 1000
//!   ttl_ms:
//!     userRoles: 300000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::Namespace;
use crate::error::{Error, Result};

/// Tables created when the store is opened
const DEFAULT_TABLES: &[&str] = &[
    "conference", "roles", "nicknames", "userinfo", "blockedusers", "pools",
    "custom_roles", "sysbanned", "sysadmins", "tech", "agents", "testers",
    "vip_users", "user_balances", "user_dailies", "casino_games", "casino_bets",
    "tickets", "report_banned", "user_reputation", "reputation_limits",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root directory; one subdirectory per table
    pub data_dir: PathBuf,
    /// Tables pre-created on open
    pub tables: Vec<String>,
    /// Fields examined in order for a record's storage key
    pub identity_fields: Vec<String>,
    /// Per-table identity field, checked before `identity_fields`
    pub primary_keys: HashMap<String, String>,
    /// Tables whose keys come from a `last_id.json` counter
    pub auto_increment_tables: Vec<String>,
    /// Fields whose predicate operands are coerced to booleans
    pub boolean_fields: Vec<String>,
    /// Fields compared equal as string or as number
    pub dual_mode_fields: Vec<String>,
    pub cache: CacheConfig,
    pub optimizer: OptimizerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            tables: DEFAULT_TABLES.iter().map(|t| t.to_string()).collect(),
            identity_fields: ["id", "userid", "user_id", "conference_id"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            primary_keys: HashMap::new(),
            auto_increment_tables: vec!["tickets".to_string()],
            boolean_fields: vec!["status".to_string()],
            dual_mode_fields: vec!["user_id".to_string(), "role_id".to_string()],
            cache: CacheConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Background sweep period
    pub sweep_interval_ms: u64,
    /// Entry ceiling per namespace
    pub max_entries: usize,
    /// TTL overrides; namespaces not listed keep their built-in TTL
    pub ttl_ms: HashMap<Namespace, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            sweep_interval_ms: 30_000,
            max_entries: 1000,
            ttl_ms: HashMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Effective TTL for a namespace
    pub fn ttl(&self, ns: Namespace) -> Duration {
        self.ttl_ms
            .get(&ns)
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or_else(|| ns.default_ttl())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    /// TTL of the secondary cache in front of direct record reads
    pub file_cache_ttl_ms: u64,
    pub file_cache_sweep_interval_ms: u64,
    /// Maximum concurrent loads per batch lookup
    pub batch_concurrency: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            file_cache_ttl_ms: 30_000,
            file_cache_sweep_interval_ms: 30_000,
            batch_concurrency: 10,
        }
    }
}

impl OptimizerConfig {
    pub fn file_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.file_cache_ttl_ms)
    }

    pub fn file_cache_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.file_cache_sweep_interval_ms)
    }
}

impl Config {
    /// Default configuration rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Config {
            data_dir: data_dir.into(),
            ..Config::default()
        }
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Write configuration as YAML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|source| Error::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Identity field configured for one table, if any
    pub fn primary_key(&self, table: &str) -> Option<&str> {
        self.primary_keys.get(table).map(String::as_str)
    }

    pub fn is_auto_increment(&self, table: &str) -> bool {
        self.auto_increment_tables.iter().any(|t| t == table)
    }

    /// Reject settings the cache and optimizer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(Error::Config {
                message: "cache.max_entries must be at least 1".to_string(),
            });
        }
        if self.optimizer.batch_concurrency == 0 {
            return Err(Error::Config {
                message: "optimizer.batch_concurrency must be at least 1".to_string(),
            });
        }
        if self.cache.sweep_interval_ms == 0 || self.optimizer.file_cache_sweep_interval_ms == 0 {
            return Err(Error::Config {
                message: "sweep intervals must be non-zero".to_string(),
            });
        }
        for table in &self.tables {
            crate::validation::validate_table_name(table)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.optimizer.batch_concurrency, 10);
        assert!(config.is_auto_increment("tickets"));
        assert!(!config.is_auto_increment("roles"));
        assert_eq!(config.identity_fields[0], "id");
        assert!(config.tables.iter().any(|t| t == "vip_users"));
    }

    #[test]
    fn test_load_partial_yaml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("filedb.yaml");
        std::fs::write(
            &path,
            "data_dir: /srv/bot\nprimary_keys:\n  vip_users: user_id\ncache:\n  ttl_ms:\n    userRoles: 1000\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/bot"));
        assert_eq!(config.primary_key("vip_users"), Some("user_id"));
        assert_eq!(config.cache.ttl(Namespace::UserRoles), Duration::from_millis(1000));
        assert_eq!(config.cache.ttl(Namespace::VipStatuses), Namespace::VipStatuses.default_ttl());
        assert_eq!(config.cache.max_entries, 1000);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("filedb.yaml");
        std::fs::write(&path, "data_dir: x\ncolour: blue\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config { .. })));
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("filedb.yaml");
        let mut config = Config::with_data_dir(tmp.path().join("data"));
        config.cache.max_entries = 50;
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
        assert_eq!(Config::load_or_default(&tmp.path().join("missing.yaml")).unwrap(), Config::default());
    }
}
