//! Outcome records for mirror passes

use strongbox_core::BackupError;

/// Outcome of a forward sync
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Segments encrypted during this pass
    pub encrypted: Vec<String>,
    /// Segments that already had an artifact
    pub already_present: usize,
    /// Per-artifact failures; other artifacts were still processed
    pub failures: Vec<BackupError>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of an orphan reclaim
#[derive(Debug, Default)]
pub struct ReclaimReport {
    /// Artifacts deleted because their segment is gone
    pub removed: Vec<String>,
    /// Leftovers of interrupted writes
    pub partials_removed: Vec<String>,
    pub failures: Vec<BackupError>,
}

impl ReclaimReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Difference between the snapshot store and the artifact store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consistency {
    /// Segments without an artifact
    pub missing: Vec<String>,
    /// Artifact-store entries without a segment
    pub orphaned: Vec<String>,
}

impl Consistency {
    /// Whether artifacts and segments map one-to-one
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}
