//! Forward sync and orphan reclaim

use crate::report::{Consistency, ReclaimReport, SyncReport};
use engine::Cipher;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use strongbox_core::layout::{artifact_name, partial_name, segment_name_of, PARTIAL_SUFFIX};
use strongbox_core::segment::list_files;
use strongbox_core::{BackupError, BackupLayout, KeyMaterial, Result};
use tracing::{debug, info, warn};

/// File-for-file encrypted shadow of the snapshot store.
///
/// Writes and deletes artifacts only; never touches segments.
pub struct EncryptionMirror<'a> {
    cipher: &'a dyn Cipher,
    snapshot_store: PathBuf,
    artifact_store: PathBuf,
}

impl<'a> EncryptionMirror<'a> {
    pub fn new(cipher: &'a dyn Cipher, snapshot_store: PathBuf, artifact_store: PathBuf) -> Self {
        Self {
            cipher,
            snapshot_store,
            artifact_store,
        }
    }

    pub fn for_layout(cipher: &'a dyn Cipher, layout: &BackupLayout) -> Self {
        Self::new(cipher, layout.snapshot_store(), layout.artifact_store())
    }

    /// Encrypt every segment lacking an artifact.
    ///
    /// Existing artifacts are never re-encrypted. A failing segment is
    /// recorded in the report and the pass moves on; only failing to list
    /// the stores aborts.
    pub async fn sync_forward(&self, key: &KeyMaterial) -> Result<SyncReport> {
        tokio::fs::create_dir_all(&self.artifact_store).await.map_err(|e| {
            BackupError::io(format!("failed to create {}", self.artifact_store.display()), e)
        })?;

        let segments = list_files(&self.snapshot_store)?;
        let artifacts = list_files(&self.artifact_store)?;
        let mut report = SyncReport::default();

        for segment in &segments {
            let artifact = artifact_name(segment);
            if artifacts.contains(&artifact) {
                report.already_present += 1;
                continue;
            }

            match self.encrypt_one(segment, &artifact, key).await {
                Ok(()) => {
                    debug!(segment = %segment, "Encrypted segment");
                    report.encrypted.push(segment.clone());
                }
                Err(e) => {
                    warn!(artifact = %artifact, "Encryption failed: {}", e);
                    report.failures.push(e);
                }
            }
        }

        info!(
            encrypted = report.encrypted.len(),
            already_present = report.already_present,
            failed = report.failures.len(),
            "Forward sync finished"
        );
        Ok(report)
    }

    /// Encrypt into a partial file and rename it into place on success
    async fn encrypt_one(&self, segment: &str, artifact: &str, key: &KeyMaterial) -> Result<()> {
        let input = self.snapshot_store.join(segment);
        let partial = self.artifact_store.join(partial_name(artifact));
        let target = self.artifact_store.join(artifact);

        remove_if_present(&partial).await?;

        if let Err(e) = self.cipher.encrypt(&input, &partial, key).await {
            if let Err(cleanup) = remove_if_present(&partial).await {
                warn!("Could not remove {}: {}", partial.display(), cleanup);
            }
            return Err(BackupError::Encryption {
                artifact: artifact.to_string(),
                reason: e.to_string(),
            });
        }

        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| BackupError::Encryption {
                artifact: artifact.to_string(),
                reason: format!("failed to move artifact into place: {}", e),
            })
    }

    /// Delete every artifact-store entry that does not map to a present
    /// segment, including leftovers of interrupted writes.
    pub async fn reclaim_orphans(&self) -> Result<ReclaimReport> {
        // An absent store would make every artifact look orphaned
        if !self.snapshot_store.is_dir() {
            return Err(BackupError::io(
                format!("snapshot store {} is missing", self.snapshot_store.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        let segments = list_files(&self.snapshot_store)?;
        let artifacts = list_files(&self.artifact_store)?;
        let mut report = ReclaimReport::default();

        for entry in &artifacts {
            let partial = entry.ends_with(PARTIAL_SUFFIX);
            if !partial && maps_to_segment(entry, &segments) {
                continue;
            }

            if !partial && segment_name_of(entry).is_none() {
                warn!(artifact = %entry, "Removing foreign file from artifact store");
            }

            match remove_if_present(&self.artifact_store.join(entry)).await {
                Ok(()) if partial => report.partials_removed.push(entry.clone()),
                Ok(()) => {
                    debug!(artifact = %entry, "Removed orphaned artifact");
                    report.removed.push(entry.clone());
                }
                Err(e) => {
                    warn!(artifact = %entry, "Failed to remove artifact: {}", e);
                    report.failures.push(BackupError::Encryption {
                        artifact: entry.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            removed = report.removed.len(),
            partials = report.partials_removed.len(),
            failed = report.failures.len(),
            "Orphan reclaim finished"
        );
        Ok(report)
    }

    /// Compare the two stores without changing either
    pub fn check_consistency(&self) -> Result<Consistency> {
        check_consistency(&self.snapshot_store, &self.artifact_store)
    }
}

/// Compare a snapshot store with its artifact store
pub fn check_consistency(snapshot_store: &Path, artifact_store: &Path) -> Result<Consistency> {
    let segments = list_files(snapshot_store)?;
    let artifacts = list_files(artifact_store)?;

    let missing = segments
        .iter()
        .filter(|segment| !artifacts.contains(&artifact_name(segment)))
        .cloned()
        .collect();
    let orphaned = artifacts
        .iter()
        .filter(|artifact| {
            artifact.ends_with(PARTIAL_SUFFIX) || !maps_to_segment(artifact, &segments)
        })
        .cloned()
        .collect();

    Ok(Consistency { missing, orphaned })
}

fn maps_to_segment(artifact: &str, segments: &BTreeSet<String>) -> bool {
    segment_name_of(artifact).is_some_and(|segment| segments.contains(segment))
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::io(format!("failed to remove {}", path.display()), e)),
    }
}
