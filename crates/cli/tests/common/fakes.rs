//! In-process stand-ins for the external collaborators

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine::snapshot::remove_dir_if_present;
use engine::{CaptureMode, CaptureRequest, Cipher, ServiceManager, SnapshotEngine};
use parking_lot::Mutex;
use retention::{collapse_increments, expire_by_age};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use strongbox_core::{
    scan_store, BackupError, KeyMaterial, Result, SegmentName, ServiceAction, SnapshotId,
};

pub type SharedClock = Arc<Mutex<DateTime<Utc>>>;

/// Writes segment files named the way the real engine does
pub struct FakeEngine {
    pub clock: SharedClock,
    pub scratch: PathBuf,
    pub calls: Mutex<Vec<&'static str>>,
    pub fail_capture: bool,
    pub fail_prune: bool,
}

impl FakeEngine {
    pub fn new(clock: SharedClock, scratch: PathBuf) -> Self {
        Self {
            clock,
            scratch,
            calls: Mutex::new(Vec::new()),
            fail_capture: false,
            fail_prune: false,
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Pruning needs the engine cache, like the real engine
    fn check_scratch(&self) -> Result<()> {
        if self.fail_prune {
            return Err(BackupError::PruneFailed("simulated".to_string()));
        }
        if !self.scratch.is_dir() {
            return Err(BackupError::PruneFailed("archive dir is gone".to_string()));
        }
        Ok(())
    }

    fn remove(&self, destination: &Path, ids: &[SnapshotId]) -> Result<()> {
        let scan = scan_store(destination)?;
        for snapshot in scan.snapshots.iter().filter(|s| ids.contains(&s.id)) {
            for file in &snapshot.files {
                std::fs::remove_file(destination.join(file))
                    .map_err(|e| BackupError::io("fake prune", e))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotEngine for FakeEngine {
    async fn capture(&self, request: &CaptureRequest) -> Result<()> {
        self.calls.lock().push("capture");
        if self.fail_capture {
            return Err(BackupError::SnapshotFailed("simulated".to_string()));
        }

        std::fs::create_dir_all(&self.scratch).map_err(|e| BackupError::io("fake scratch", e))?;
        std::fs::create_dir_all(&request.destination)
            .map_err(|e| BackupError::io("fake store", e))?;

        let now = *self.clock.lock();
        let previous = scan_store(&request.destination)?
            .snapshots
            .last()
            .map(|s| s.end());

        let name = match (request.mode, previous) {
            (CaptureMode::Incremental, Some(start)) => SegmentName::incremental_volume(start, now),
            _ => SegmentName::full_volume(now),
        };
        std::fs::write(request.destination.join(name), b"snapshot data")
            .map_err(|e| BackupError::io("fake capture", e))
    }

    async fn prune_older_than(&self, destination: &Path, cutoff: Duration) -> Result<()> {
        self.calls.lock().push("prune_older_than");
        self.check_scratch()?;

        let now = *self.clock.lock();
        let scan = scan_store(destination)?;
        self.remove(destination, &expire_by_age(&scan.snapshots, cutoff, now))
    }

    async fn collapse_increments(&self, destination: &Path, keep_full_count: usize) -> Result<()> {
        self.calls.lock().push("collapse_increments");
        self.check_scratch()?;

        let scan = scan_store(destination)?;
        self.remove(destination, &collapse_increments(&scan.snapshots, keep_full_count)?)
    }

    fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    async fn reclaim_scratch(&self) -> Result<()> {
        self.calls.lock().push("reclaim_scratch");
        remove_dir_if_present(&self.scratch).await
    }
}

/// Records every stop and start
#[derive(Default)]
pub struct FakeServices {
    pub calls: Mutex<Vec<(String, ServiceAction)>>,
    pub fail_stop: Option<String>,
    pub fail_start: Option<String>,
}

impl FakeServices {
    pub fn actions(&self, action: ServiceAction) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, a)| *a == action)
            .map(|(s, _)| s.clone())
            .collect()
    }

    fn record(&self, service: &str, action: ServiceAction, fail: &Option<String>) -> Result<()> {
        self.calls.lock().push((service.to_string(), action));
        if fail.as_deref() == Some(service) {
            return Err(BackupError::ServiceControl {
                service: service.to_string(),
                action,
                reason: "simulated".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceManager for FakeServices {
    async fn stop(&self, service: &str) -> Result<()> {
        self.record(service, ServiceAction::Stop, &self.fail_stop)
    }

    async fn start(&self, service: &str) -> Result<()> {
        self.record(service, ServiceAction::Start, &self.fail_start)
    }
}

/// Prefixes plaintext with a marker
#[derive(Default)]
pub struct FakeCipher {
    pub fail: bool,
}

#[async_trait]
impl Cipher for FakeCipher {
    async fn encrypt(&self, input: &Path, output: &Path, _key: &KeyMaterial) -> Result<()> {
        if self.fail {
            return Err(BackupError::Encryption {
                artifact: output.display().to_string(),
                reason: "simulated".to_string(),
            });
        }
        let mut data = b"ENC:".to_vec();
        data.extend(std::fs::read(input).map_err(|e| BackupError::io("fake encrypt", e))?);
        std::fs::write(output, data).map_err(|e| BackupError::io("fake encrypt", e))
    }

    async fn decrypt(&self, input: &Path, output: &Path, _key: &KeyMaterial) -> Result<()> {
        let data = std::fs::read(input).map_err(|e| BackupError::io("fake decrypt", e))?;
        let plain = data.strip_prefix(b"ENC:").unwrap_or(&data);
        std::fs::write(output, plain).map_err(|e| BackupError::io("fake decrypt", e))
    }
}
