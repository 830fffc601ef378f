//! Backup configuration
//!
//! Loaded from a TOML file (default `/etc/strongbox/backup.toml`). Every key
//! is optional; a missing file yields the defaults. `STORAGE_ROOT` in the
//! environment overrides `storage_root`.

use crate::error::BackupError;
use crate::layout::BackupLayout;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/strongbox/backup.toml";

/// Environment variable overriding the data store root
pub const STORAGE_ROOT_ENV: &str = "STORAGE_ROOT";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Root of the live data store being backed up
    pub storage_root: PathBuf,
    /// Backup directory (default: `<storage_root>/backup`)
    pub backup_dir: Option<PathBuf>,
    /// Logical backup name handed to the snapshot engine
    pub name: String,
    /// Directory holding run lock files
    pub lock_dir: PathBuf,
    /// Name of the run lock
    pub lock_name: String,
    /// Services stopped while the snapshot is captured, in stop order
    pub services: Vec<String>,
    /// Extra paths excluded from capture
    pub exclude: Vec<PathBuf>,
    pub retention: RetentionConfig,
    pub engine: EngineConfig,
    pub service_manager: ServiceManagerConfig,
    pub cipher: CipherConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Maximum age of a retained snapshot chain, in days
    pub max_age_days: u64,
    /// Number of full snapshots whose incremental history is kept
    pub keep_full_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub program: PathBuf,
    /// Engine cache directory, removed after pruning
    pub scratch_dir: PathBuf,
    pub verbosity: String,
    /// Watchdog for a single engine invocation (none = wait forever)
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceManagerConfig {
    pub program: PathBuf,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    pub program: PathBuf,
    pub algorithm: String,
    /// Passphrase file (default: `<backup_dir>/secret_key.txt`)
    pub key_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when no `-v` flag is given
    pub level: String,
    /// Directory for a daily rolling log file
    pub directory: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("/home/user-data"),
            backup_dir: None,
            name: "strongbox".to_string(),
            lock_dir: PathBuf::from("/var/run/strongbox"),
            lock_name: "backup".to_string(),
            services: vec!["dovecot".to_string(), "postfix".to_string()],
            exclude: Vec::new(),
            retention: RetentionConfig::default(),
            engine: EngineConfig::default(),
            service_manager: ServiceManagerConfig::default(),
            cipher: CipherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Largest accepted `max_age_days`, about a century
pub const MAX_AGE_DAYS_LIMIT: u64 = 36_500;

impl RetentionConfig {
    /// Retention cutoff as a duration
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_days.saturating_mul(SECS_PER_DAY))
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 31,
            keep_full_count: 1,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/usr/bin/duplicity"),
            scratch_dir: PathBuf::from("/tmp/duplicity-archive-dir"),
            verbosity: "warning".to_string(),
            timeout_secs: None,
        }
    }
}

impl Default for ServiceManagerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/usr/sbin/service"),
            timeout_secs: Some(120),
        }
    }
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/usr/bin/openssl"),
            algorithm: "aes-256-cbc".to_string(),
            key_file: None,
            timeout_secs: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl BackupConfig {
    /// Load configuration from `path`, apply environment overrides and validate.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| BackupError::io(format!("failed to read {}", path.display()), e))?;
            Self::from_toml_str(&text)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        if let Some(root) = std::env::var_os(STORAGE_ROOT_ENV) {
            config.storage_root = PathBuf::from(root);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text without touching the environment
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BackupError::Config(e.to_string()))
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BackupError::Config(e.to_string()))
    }

    /// Check value ranges and path relationships
    pub fn validate(&self) -> Result<()> {
        if self.retention.keep_full_count == 0 {
            return Err(BackupError::Config(
                "retention.keep_full_count must be at least 1".to_string(),
            ));
        }
        if self.retention.max_age_days == 0 {
            return Err(BackupError::Config(
                "retention.max_age_days must be at least 1".to_string(),
            ));
        }
        if self.retention.max_age_days > MAX_AGE_DAYS_LIMIT {
            return Err(BackupError::Config(format!(
                "retention.max_age_days must be at most {}",
                MAX_AGE_DAYS_LIMIT
            )));
        }
        if self.lock_name.trim().is_empty() || self.lock_name.contains('/') {
            return Err(BackupError::Config(format!(
                "lock_name '{}' is not a valid file name",
                self.lock_name
            )));
        }
        if self.name.trim().is_empty() {
            return Err(BackupError::Config("name must not be empty".to_string()));
        }
        if self.backup_dir() == self.storage_root {
            return Err(BackupError::Config(
                "backup_dir must differ from storage_root".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved backup directory
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.storage_root.join("backup"))
    }

    /// On-disk layout derived from this configuration
    pub fn layout(&self) -> BackupLayout {
        let mut layout = BackupLayout::new(self.backup_dir());
        if let Some(key_file) = &self.cipher.key_file {
            layout = layout.with_key_file(key_file.clone());
        }
        layout
    }
}

/// Convert an optional seconds value into a watchdog duration
pub fn timeout_from_secs(secs: Option<u64>) -> Option<Duration> {
    secs.map(Duration::from_secs)
}
