//! Error taxonomy for the backup pipeline

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Service manager action that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Stop,
    Start,
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceAction::Stop => write!(f, "stop"),
            ServiceAction::Start => write!(f, "start"),
        }
    }
}

/// Errors raised by pipeline components
#[derive(Debug, Error)]
pub enum BackupError {
    /// Another live process holds the run lock
    #[error("backup '{name}' is already running (pid {pid})")]
    AlreadyRunning { name: String, pid: u32 },

    /// Stopping or starting a dependent service failed
    #[error("failed to {action} service '{service}': {reason}")]
    ServiceControl {
        service: String,
        action: ServiceAction,
        reason: String,
    },

    /// The delta-snapshot engine could not capture a snapshot
    #[error("snapshot capture failed: {0}")]
    SnapshotFailed(String),

    /// An age-based or collapse prune failed
    #[error("snapshot pruning failed: {0}")]
    PruneFailed(String),

    /// Encrypting or removing one artifact failed
    #[error("encryption of '{artifact}' failed: {reason}")]
    Encryption { artifact: String, reason: String },

    /// The retention configuration would leave no restorable backup
    #[error("retention policy misconfigured: {0}")]
    RetentionMisconfigured(String),

    /// The key file is absent or unreadable
    #[error("backup key material not found at {}", .0.display())]
    MissingKey(PathBuf),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An external invocation exceeded its watchdog timeout
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    /// Filesystem error with context
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    /// Wrap an I/O error with a short description of what was attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BackupError::Io {
            context: context.into(),
            source,
        }
    }
}
