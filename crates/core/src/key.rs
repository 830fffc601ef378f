//! Passphrase file handed to the cipher utility

use crate::error::BackupError;
use crate::Result;
use std::path::{Path, PathBuf};

/// Long-lived key material stored outside the snapshot store.
///
/// Only the path is held; the passphrase itself is read by the cipher
/// utility and never loaded into this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    path: PathBuf,
}

impl KeyMaterial {
    /// Open the key file, failing with `MissingKey` if it is absent, empty
    /// or unreadable. Absence is a configuration error and is not retried.
    pub fn open(path: &Path) -> Result<Self> {
        let metadata =
            std::fs::metadata(path).map_err(|_| BackupError::MissingKey(path.to_path_buf()))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(BackupError::MissingKey(path.to_path_buf()));
        }

        // Opening proves readability without loading the secret
        std::fs::File::open(path).map_err(|_| BackupError::MissingKey(path.to_path_buf()))?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
