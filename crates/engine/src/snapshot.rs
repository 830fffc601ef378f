//! Delta-snapshot engine interface and the duplicity adapter

use crate::runner::{file_url, Invocation, ProcessRunner};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strongbox_core::config::timeout_from_secs;
use strongbox_core::{BackupConfig, BackupError, Result};

/// Capture mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Complete capture, requested explicitly by the operator
    Full,
    /// Delta since the previous snapshot
    #[default]
    Incremental,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Full => write!(f, "full"),
            CaptureMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Everything the engine needs for one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Must contain the destination store
    pub exclude: Vec<PathBuf>,
    pub mode: CaptureMode,
}

/// External mechanism producing and pruning snapshots
#[async_trait]
pub trait SnapshotEngine: Send + Sync {
    /// Capture a full or incremental snapshot of `source` into `destination`
    async fn capture(&self, request: &CaptureRequest) -> Result<()>;

    /// Remove snapshots older than `cutoff`
    async fn prune_older_than(&self, destination: &Path, cutoff: Duration) -> Result<()>;

    /// Remove increments made redundant by fulls beyond `keep_full_count`
    async fn collapse_increments(&self, destination: &Path, keep_full_count: usize) -> Result<()>;

    /// Transient cache directory used by the engine
    fn scratch_dir(&self) -> &Path;

    /// Delete the scratch directory. Only valid once pruning has finished.
    async fn reclaim_scratch(&self) -> Result<()> {
        remove_dir_if_present(self.scratch_dir()).await
    }
}

/// Remove a directory tree, treating "not found" as success
pub async fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            tracing::debug!("Removed scratch directory {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::io(format!("failed to remove {}", dir.display()), e)),
    }
}

/// duplicity-backed snapshot engine
#[derive(Debug, Clone)]
pub struct DuplicityEngine {
    program: PathBuf,
    name: String,
    scratch_dir: PathBuf,
    verbosity: String,
    runner: ProcessRunner,
}

impl DuplicityEngine {
    pub fn new(
        program: PathBuf,
        name: String,
        scratch_dir: PathBuf,
        verbosity: String,
        runner: ProcessRunner,
    ) -> Self {
        Self {
            program,
            name,
            scratch_dir,
            verbosity,
            runner,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(
            config.engine.program.clone(),
            config.name.clone(),
            config.engine.scratch_dir.clone(),
            config.engine.verbosity.clone(),
            ProcessRunner::new(timeout_from_secs(config.engine.timeout_secs)),
        )
    }

    /// `duplicity full|incr ... <source> file://<destination>`
    pub fn capture_invocation(&self, request: &CaptureRequest) -> Invocation {
        let mode = match request.mode {
            CaptureMode::Full => "full",
            CaptureMode::Incremental => "incr",
        };

        let mut inv = Invocation::new(&self.program)
            .arg(mode)
            .arg("--no-encryption")
            .arg("--archive-dir")
            .arg(&self.scratch_dir)
            .arg("--name")
            .arg(&self.name);
        for path in &request.exclude {
            inv = inv.arg("--exclude").arg(path);
        }
        inv.arg("--verbosity")
            .arg(&self.verbosity)
            .arg(&request.source)
            .arg(file_url(&request.destination))
    }

    /// `duplicity remove-older-than <age> ... --force file://<destination>`
    pub fn prune_invocation(&self, destination: &Path, cutoff: Duration) -> Invocation {
        self.with_prune_trailer(
            Invocation::new(&self.program)
                .arg("remove-older-than")
                .arg(format_age(cutoff)),
            destination,
        )
    }

    /// `duplicity remove-all-inc-of-but-n-full <n> ... --force file://<destination>`
    pub fn collapse_invocation(&self, destination: &Path, keep_full_count: usize) -> Invocation {
        self.with_prune_trailer(
            Invocation::new(&self.program)
                .arg("remove-all-inc-of-but-n-full")
                .arg(keep_full_count.to_string()),
            destination,
        )
    }

    fn with_prune_trailer(&self, inv: Invocation, destination: &Path) -> Invocation {
        inv.arg("--archive-dir")
            .arg(&self.scratch_dir)
            .arg("--name")
            .arg(&self.name)
            .arg("--force")
            .arg("--verbosity")
            .arg(&self.verbosity)
            .arg(file_url(destination))
    }
}

/// Engine time string: whole days as `<n>D`, otherwise seconds
fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs > 0 && secs % 86400 == 0 {
        format!("{}D", secs / 86400)
    } else {
        format!("{}s", secs)
    }
}

#[async_trait]
impl SnapshotEngine for DuplicityEngine {
    async fn capture(&self, request: &CaptureRequest) -> Result<()> {
        if !request.exclude.iter().any(|p| request.destination.starts_with(p)) {
            return Err(BackupError::SnapshotFailed(format!(
                "destination {} is not excluded from capture",
                request.destination.display()
            )));
        }

        let inv = self.capture_invocation(request);
        tracing::info!(mode = %request.mode, "Capturing snapshot of {}", request.source.display());
        self.runner
            .run(&inv)
            .await
            .map(|_| ())
            .map_err(|e| e.into_backup_error("snapshot capture", BackupError::SnapshotFailed))
    }

    async fn prune_older_than(&self, destination: &Path, cutoff: Duration) -> Result<()> {
        let inv = self.prune_invocation(destination, cutoff);
        self.runner
            .run(&inv)
            .await
            .map(|_| ())
            .map_err(|e| e.into_backup_error("age prune", BackupError::PruneFailed))
    }

    async fn collapse_increments(&self, destination: &Path, keep_full_count: usize) -> Result<()> {
        let inv = self.collapse_invocation(destination, keep_full_count);
        self.runner
            .run(&inv)
            .await
            .map(|_| ())
            .map_err(|e| e.into_backup_error("increment collapse", BackupError::PruneFailed))
    }

    fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}
