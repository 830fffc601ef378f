//! Snapshot segment naming and store scanning
//!
//! The delta engine writes several files per logical snapshot:
//!
//! ```text
//! duplicity-full.20240101T020000Z.vol1.difftar.gz
//! duplicity-full.20240101T020000Z.manifest
//! duplicity-full-signatures.20240101T020000Z.sigtar.gz
//! duplicity-inc.20240101T020000Z.to.20240102T020000Z.vol1.difftar.gz
//! duplicity-inc.20240101T020000Z.to.20240102T020000Z.manifest
//! duplicity-new-signatures.20240101T020000Z.to.20240102T020000Z.sigtar.gz
//! ```
//!
//! Every regular file is a segment for mirroring purposes. Files whose names
//! parse are additionally grouped into [`Snapshot`]s for retention.

use crate::error::BackupError;
use crate::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use walkdir::WalkDir;

const PREFIX: &str = "duplicity-";
const TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Kind of a snapshot segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentKind {
    /// Complete, self-sufficient capture
    Full,
    /// Delta since the prior snapshot in its chain
    Incremental,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentKind::Full => write!(f, "full"),
            SegmentKind::Incremental => write!(f, "incremental"),
        }
    }
}

/// Parsed segment file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName {
    pub kind: SegmentKind,
    /// End time of the snapshot the increment depends on (increments only)
    pub start: Option<DateTime<Utc>>,
    /// Time the snapshot was taken
    pub end: DateTime<Utc>,
}

impl SegmentName {
    /// Parse an engine file name, returning `None` for foreign files
    pub fn parse(file_name: &str) -> Option<Self> {
        let rest = file_name.strip_prefix(PREFIX)?;
        let mut parts = rest.split('.');

        match parts.next()? {
            "full" | "full-signatures" => {
                let end = parse_time(parts.next()?)?;
                Some(Self {
                    kind: SegmentKind::Full,
                    start: None,
                    end,
                })
            }
            "inc" | "new-signatures" => {
                let start = parse_time(parts.next()?)?;
                if parts.next()? != "to" {
                    return None;
                }
                let end = parse_time(parts.next()?)?;
                if end <= start {
                    return None;
                }
                Some(Self {
                    kind: SegmentKind::Incremental,
                    start: Some(start),
                    end,
                })
            }
            _ => None,
        }
    }

    /// Identity of the logical snapshot this file belongs to
    pub fn snapshot_id(&self) -> SnapshotId {
        SnapshotId {
            end: self.end,
            kind: self.kind,
        }
    }

    /// File name of a full snapshot volume
    pub fn full_volume(end: DateTime<Utc>) -> String {
        format!("{}full.{}.vol1.difftar.gz", PREFIX, format_time(end))
    }

    /// File name of an incremental snapshot volume
    pub fn incremental_volume(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "{}inc.{}.to.{}.vol1.difftar.gz",
            PREFIX,
            format_time(start),
            format_time(end)
        )
    }
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format a time the way the engine names its files
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Identity of a logical snapshot (ordered by time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId {
    pub end: DateTime<Utc>,
    pub kind: SegmentKind,
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, format_time(self.end))
    }
}

/// A logical snapshot: every segment file sharing a kind and end time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub start: Option<DateTime<Utc>>,
    pub files: Vec<String>,
    pub size: u64,
}

impl Snapshot {
    /// Build a snapshot record without files (useful for planning)
    pub fn new(kind: SegmentKind, start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Self {
        Self {
            id: SnapshotId { end, kind },
            start,
            files: Vec::new(),
            size: 0,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        self.id.kind
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.id.end
    }

    pub fn is_full(&self) -> bool {
        self.id.kind == SegmentKind::Full
    }

    /// Age relative to `now` (zero for snapshots from the future)
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.id.end).to_std().unwrap_or_default()
    }
}

/// Result of scanning the snapshot store
#[derive(Debug, Clone, Default)]
pub struct StoreScan {
    /// Every regular file in the store
    pub files: BTreeSet<String>,
    /// Recognised files grouped into snapshots, oldest first
    pub snapshots: Vec<Snapshot>,
    /// Files that take no part in retention
    pub unrecognised: Vec<String>,
}

/// List regular files directly inside `dir`. A missing directory is empty.
///
/// A file whose name is not UTF-8 is an error: it could be neither
/// mirrored nor reclaimed, so it must never be silently left out.
pub fn list_files(dir: &Path) -> Result<BTreeSet<String>> {
    Ok(list_files_with_size(dir)?.into_keys().collect())
}

fn list_files_with_size(dir: &Path) -> Result<BTreeMap<String, u64>> {
    let mut files = BTreeMap::new();
    if !dir.exists() {
        return Ok(files);
    }

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let context = format!("failed to list {}", dir.display());
            match e.into_io_error() {
                Some(io) => BackupError::io(context, io),
                None => BackupError::io(context, std::io::Error::other("filesystem loop")),
            }
        })?;

        if !entry.file_type().is_file() {
            tracing::debug!("Skipping non-file entry {}", entry.path().display());
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            return Err(BackupError::io(
                format!("failed to list {}", dir.display()),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("non UTF-8 file name {:?}", entry.file_name()),
                ),
            ));
        };

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        files.insert(name.to_string(), size);
    }

    Ok(files)
}

/// Scan the snapshot store
pub fn scan_store(dir: &Path) -> Result<StoreScan> {
    let files = list_files_with_size(dir)?;
    let mut grouped: BTreeMap<SnapshotId, Snapshot> = BTreeMap::new();
    let mut unrecognised = Vec::new();

    for (name, size) in &files {
        match SegmentName::parse(name) {
            Some(parsed) => {
                let snapshot = grouped
                    .entry(parsed.snapshot_id())
                    .or_insert_with(|| Snapshot::new(parsed.kind, parsed.start, parsed.end));
                snapshot.files.push(name.clone());
                snapshot.size += size;
            }
            None => unrecognised.push(name.clone()),
        }
    }

    Ok(StoreScan {
        files: files.into_keys().collect(),
        snapshots: grouped.into_values().collect(),
        unrecognised,
    })
}
