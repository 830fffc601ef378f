//! On-disk layout of the backup directory
//!
//! ```text
//! <backup_dir>/
//!   duplicity/        plaintext snapshot store (written by the engine)
//!   encrypted/        encrypted mirror, one `<segment>.enc` per segment
//!   secret_key.txt    passphrase file (never written by the pipeline)
//! ```

use crate::error::BackupError;
use crate::Result;
use std::path::{Path, PathBuf};

/// Suffix appended to a segment file name to form its artifact name
pub const ARTIFACT_SUFFIX: &str = ".enc";

/// Suffix of an artifact that is still being written
pub const PARTIAL_SUFFIX: &str = ".partial";

const SNAPSHOT_STORE_DIR: &str = "duplicity";
const ARTIFACT_STORE_DIR: &str = "encrypted";
const KEY_FILE_NAME: &str = "secret_key.txt";

/// Paths of the backup directory and its members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    backup_dir: PathBuf,
    key_file: PathBuf,
}

impl BackupLayout {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        let backup_dir = backup_dir.into();
        let key_file = backup_dir.join(KEY_FILE_NAME);
        Self {
            backup_dir,
            key_file,
        }
    }

    /// Use a key file outside the backup directory
    pub fn with_key_file(mut self, key_file: PathBuf) -> Self {
        self.key_file = key_file;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Plaintext snapshot store managed by the snapshot engine
    pub fn snapshot_store(&self) -> PathBuf {
        self.backup_dir.join(SNAPSHOT_STORE_DIR)
    }

    /// Encrypted artifact store managed by the encryption mirror
    pub fn artifact_store(&self) -> PathBuf {
        self.backup_dir.join(ARTIFACT_STORE_DIR)
    }

    pub fn key_file(&self) -> &Path {
        &self.key_file
    }

    /// Create the backup directory and both stores if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.snapshot_store(), self.artifact_store()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| BackupError::io(format!("failed to create {}", dir.display()), e))?;
        }
        Ok(())
    }

    /// Exclusion list for capture.
    ///
    /// Always starts with the backup directory and both stores so the engine
    /// never captures its own output; `extra` follows, deduplicated.
    pub fn capture_excludes(&self, extra: &[PathBuf]) -> Vec<PathBuf> {
        let mut excludes = vec![
            self.backup_dir.clone(),
            self.snapshot_store(),
            self.artifact_store(),
        ];
        for path in extra {
            if !excludes.contains(path) {
                excludes.push(path.clone());
            }
        }
        excludes
    }
}

/// Deterministic artifact file name for a segment file name
pub fn artifact_name(segment: &str) -> String {
    format!("{}{}", segment, ARTIFACT_SUFFIX)
}

/// Segment file name an artifact was derived from, if it is a finished artifact
pub fn segment_name_of(artifact: &str) -> Option<&str> {
    artifact
        .strip_suffix(ARTIFACT_SUFFIX)
        .filter(|segment| !segment.is_empty())
}

/// Temporary name used while an artifact is being written
pub fn partial_name(artifact: &str) -> String {
    format!("{}{}", artifact, PARTIAL_SUFFIX)
}
