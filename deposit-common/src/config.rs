//! Configuration loading and config file resolution
//!
//! Every section has compiled defaults, so a missing or partial TOML file
//! never prevents startup. A file that exists but does not parse is an error.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::model::DepositStatus;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "DEPOSIT_SERVICES_CONFIG";

/// Top-level configuration of the deposit services
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositServicesConfig {
    pub workers: WorkerConfig,
    pub notifications: NotificationConfig,
    pub status_ref: StatusRefRewrite,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub repositories: Vec<RepositoryConfig>,
}

/// Deposit worker pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of deposit tasks executed concurrently
    pub concurrency: usize,
    /// Tasks that may wait for a worker before `execute` rejects
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Notifications buffered per subscriber before it starts lagging
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Rewriting applied to remote status-document URLs before they are persisted
///
/// Remote systems may advertise an internal hostname that is not reachable
/// from where the status reference is later resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusRefRewrite {
    pub prefix_to_match: Option<String>,
    pub replacement_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file; in-memory store when absent
    pub database_path: Option<PathBuf>,
    /// Base URI for minted resource identifiers
    pub base_uri: String,
    /// Upper bound for retrying "database is locked" errors
    pub max_lock_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            base_uri: "http://localhost:8080/fcrepo/rest".to_string(),
            max_lock_wait_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; RUST_LOG overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Wire protocol used to reach a downstream repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportBinding {
    Ftp,
    SwordV2,
    Filesystem,
}

impl std::fmt::Display for TransportBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportBinding::Ftp => "ftp",
            TransportBinding::SwordV2 => "swordv2",
            TransportBinding::Filesystem => "filesystem",
        };
        f.write_str(name)
    }
}

/// Per-repository packaging, transport and status configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Lookup key matched against the repository's key, name or URI
    pub key: String,
    pub transport: TransportConfig,
    #[serde(default)]
    pub assembler: AssemblerConfig,
    #[serde(default)]
    pub status_mapping: StatusMappingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub protocol: TransportBinding,
    /// Flat protocol-specific properties (endpoint, credentials, directories)
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Package specification produced by the assembler
    pub spec: String,
    pub options: HashMap<String, String>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            spec: "json".to_string(),
            options: HashMap::new(),
        }
    }
}

/// Maps remote status URIs to deposit statuses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusMappingConfig {
    /// Status used for URIs with no explicit mapping
    pub default: Option<DepositStatus>,
    pub statuses: HashMap<String, DepositStatus>,
}

impl DepositServicesConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from the resolved config path, or fall back to defaults
    ///
    /// Returns the path that was loaded, if any.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        match ConfigResolver::new(CONFIG_ENV_VAR).resolve(cli_arg) {
            Some(path) if path.exists() => {
                let config = Self::load(&path)?;
                tracing::info!("Loaded configuration from {}", path.display());
                Ok((config, Some(path)))
            }
            Some(path) => {
                tracing::warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Ok((Self::default(), None))
            }
            None => {
                tracing::warn!("No config file found, using compiled defaults");
                Ok((Self::default(), None))
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers.concurrency == 0 {
            return Err(Error::Config("workers.concurrency must be at least 1".to_string()));
        }
        if self.workers.queue_capacity == 0 {
            return Err(Error::Config("workers.queue_capacity must be at least 1".to_string()));
        }
        if self.notifications.capacity == 0 {
            return Err(Error::Config("notifications.capacity must be at least 1".to_string()));
        }

        if self.status_ref.prefix_to_match.is_some() != self.status_ref.replacement_prefix.is_some() {
            return Err(Error::Config(
                "status_ref.prefix_to_match and status_ref.replacement_prefix must be set together"
                    .to_string(),
            ));
        }

        let mut keys = HashSet::new();
        for repository in &self.repositories {
            if repository.key.trim().is_empty() {
                return Err(Error::Config("repository key must not be empty".to_string()));
            }
            if !keys.insert(repository.key.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate repository key '{}'",
                    repository.key
                )));
            }
        }
        Ok(())
    }

    pub fn repository(&self, key: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.key == key)
    }
}

/// Config file resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `<config_dir>/deposit-services/config.toml`
pub struct ConfigResolver {
    env_var_name: String,
}

impl ConfigResolver {
    pub fn new(env_var_name: impl Into<String>) -> Self {
        Self {
            env_var_name: env_var_name.into(),
        }
    }

    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_path().filter(|path| path.exists())
    }
}

/// Platform config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("deposit-services").join("config.toml"))
}
