//! Backup pipeline orchestration
//!
//! ```text
//! Idle -> Locked -> Quiesced -> Captured -> Pruned -> Synced -> Done
//! ```
//!
//! `Failed` is reachable from every state after `Locked` (and from `Idle`
//! when the run lock is taken). Steps before the failing one keep their side
//! effects; every step is safe to repeat on the next scheduled run.

use crate::locks::RunLock;
use crate::quiesce::QuiesceController;
use chrono::{DateTime, Utc};
use engine::{CaptureMode, CaptureRequest, Cipher, ServiceManager, SnapshotEngine};
use mirror::{EncryptionMirror, ReclaimReport, SyncReport};
use retention::{PruneInstruction, PrunePlan, RetentionPolicy};
use std::fmt;
use strongbox_core::{scan_store, BackupConfig, BackupError, BackupLayout, KeyMaterial};
use thiserror::Error;
use tracing::{error, info, warn, Instrument};
use ulid::Ulid;

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Locked,
    Quiesced,
    Captured,
    Pruned,
    Synced,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Locked => "locked",
            PipelineState::Quiesced => "quiesced",
            PipelineState::Captured => "captured",
            PipelineState::Pruned => "pruned",
            PipelineState::Synced => "synced",
            PipelineState::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// What a run did
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Ulid,
    pub mode: CaptureMode,
    /// States reached, in order
    pub states: Vec<PipelineState>,
    pub prune_plan: Option<PrunePlan>,
    pub sync: Option<SyncReport>,
    pub reclaim: Option<ReclaimReport>,
    /// Non-fatal problems (failed prunes, scratch cleanup)
    pub warnings: Vec<BackupError>,
}

impl RunReport {
    fn new(run_id: Ulid, mode: CaptureMode) -> Self {
        Self {
            run_id,
            mode,
            states: vec![PipelineState::Idle],
            prune_plan: None,
            sync: None,
            reclaim: None,
            warnings: Vec::new(),
        }
    }

    /// Last state reached
    pub fn state(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }

    fn advance(&mut self, next: PipelineState) {
        info!(from = %self.state(), to = %next, "Pipeline transition");
        self.states.push(next);
    }

    fn fail(self, state: PipelineState, errors: Vec<BackupError>) -> PipelineFailure {
        for e in &errors {
            error!(state = %state, "Backup failed: {}", e);
        }
        PipelineFailure {
            state,
            errors,
            report: self,
        }
    }
}

/// Terminal failure of a run
#[derive(Debug, Error)]
#[error("backup failed in state '{state}' ({} error(s))", .errors.len())]
pub struct PipelineFailure {
    /// State the pipeline was in when the failing step ran
    pub state: PipelineState,
    /// Every error that contributed, in the order they occurred
    pub errors: Vec<BackupError>,
    /// Progress made before the failure
    pub report: RunReport,
}

type Clock<'a> = Box<dyn Fn() -> DateTime<Utc> + Send + Sync + 'a>;

/// Sequences lock, quiesce, capture, prune and encryption sync
pub struct Pipeline<'a> {
    config: &'a BackupConfig,
    engine: &'a dyn SnapshotEngine,
    services: &'a dyn ServiceManager,
    cipher: &'a dyn Cipher,
    clock: Clock<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a BackupConfig,
        engine: &'a dyn SnapshotEngine,
        services: &'a dyn ServiceManager,
        cipher: &'a dyn Cipher,
    ) -> Self {
        Self {
            config,
            engine,
            services,
            cipher,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the clock used for retention decisions
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Execute one run
    pub async fn run(&self, mode: CaptureMode) -> Result<RunReport, PipelineFailure> {
        let run_id = Ulid::new();
        let span = tracing::info_span!("backup", %run_id, %mode);
        self.run_inner(RunReport::new(run_id, mode)).instrument(span).await
    }

    async fn run_inner(&self, mut report: RunReport) -> Result<RunReport, PipelineFailure> {
        // Idle -> Locked; held until this function returns
        let lock = match RunLock::acquire(&self.config.lock_dir, &self.config.lock_name) {
            Ok(lock) => lock,
            Err(e) => return Err(report.fail(PipelineState::Idle, vec![e])),
        };
        report.advance(PipelineState::Locked);

        let layout = self.config.layout();
        let key = match layout
            .ensure_dirs()
            .and_then(|_| KeyMaterial::open(layout.key_file()))
        {
            Ok(key) => key,
            Err(e) => return Err(report.fail(PipelineState::Locked, vec![e])),
        };

        // Locked -> Quiesced -> Captured
        let request = CaptureRequest {
            source: self.config.storage_root.clone(),
            destination: layout.snapshot_store(),
            exclude: layout.capture_excludes(&self.config.exclude),
            mode: report.mode,
        };
        let controller = QuiesceController::new(self.services);
        let outcome = controller
            .scope(&self.config.services, || self.engine.capture(&request))
            .await;

        if outcome.quiesced {
            report.advance(PipelineState::Quiesced);
        }
        let restart_failures = outcome.restart_failures;
        if let Err(e) = outcome.body {
            let state = if outcome.quiesced {
                PipelineState::Quiesced
            } else {
                PipelineState::Locked
            };
            let mut errors = vec![e];
            errors.extend(restart_failures);
            return Err(report.fail(state, errors));
        }
        report.advance(PipelineState::Captured);

        // Captured -> Pruned (best effort)
        self.prune(&layout, &mut report).await;
        report.advance(PipelineState::Pruned);

        // Pruned -> Synced
        if let Err(mut errors) = self.sync(&layout, &key, &mut report).await {
            errors.extend(restart_failures);
            return Err(report.fail(PipelineState::Pruned, errors));
        }
        report.advance(PipelineState::Synced);

        if !restart_failures.is_empty() {
            return Err(report.fail(PipelineState::Quiesced, restart_failures));
        }

        report.advance(PipelineState::Done);
        lock.release();
        Ok(report)
    }

    /// Plan retention, run both prune calls in order, then reclaim scratch.
    /// Failures become warnings.
    async fn prune(&self, layout: &BackupLayout, report: &mut RunReport) {
        let destination = layout.snapshot_store();
        let policy = RetentionPolicy::from_config(&self.config.retention);
        let now = (self.clock)();

        match scan_store(&destination).and_then(|scan| policy.plan(&scan.snapshots, now)) {
            Ok(plan) => {
                for id in &plan.expired {
                    info!(snapshot = %id, "Expected to expire by age");
                }
                for id in &plan.collapsed {
                    info!(snapshot = %id, "Expected to collapse");
                }

                for instruction in &plan.instructions {
                    let result = match *instruction {
                        PruneInstruction::OlderThan(cutoff) => {
                            self.engine.prune_older_than(&destination, cutoff).await
                        }
                        PruneInstruction::CollapseIncrements(keep) => {
                            self.engine.collapse_increments(&destination, keep).await
                        }
                    };
                    if let Err(e) = result {
                        warn!(instruction = %instruction, "Prune failed, continuing: {}", e);
                        report.warnings.push(e);
                    }
                }
                report.prune_plan = Some(plan);
            }
            Err(e) => {
                error!("Retention planning failed, nothing pruned: {}", e);
                report.warnings.push(e);
            }
        }

        // Pruning may use the engine cache, so it goes only now
        if let Err(e) = self.engine.reclaim_scratch().await {
            warn!("Failed to remove engine scratch directory: {}", e);
            report.warnings.push(e);
        }
    }

    /// Forward sync, orphan reclaim, then verify the one-to-one mapping
    async fn sync(
        &self,
        layout: &BackupLayout,
        key: &KeyMaterial,
        report: &mut RunReport,
    ) -> Result<(), Vec<BackupError>> {
        let mirror = EncryptionMirror::for_layout(self.cipher, layout);

        let mut sync = mirror.sync_forward(key).await.map_err(|e| vec![e])?;
        let mut reclaim = mirror.reclaim_orphans().await.map_err(|e| vec![e])?;
        let consistency = mirror.check_consistency().map_err(|e| vec![e])?;

        let mut errors = Vec::new();
        errors.extend(sync.failures.drain(..));
        errors.extend(reclaim.failures.drain(..));
        report.sync = Some(sync);
        report.reclaim = Some(reclaim);

        if errors.is_empty() && !consistency.is_consistent() {
            errors.push(BackupError::Encryption {
                artifact: consistency
                    .missing
                    .iter()
                    .chain(consistency.orphaned.iter())
                    .next()
                    .cloned()
                    .unwrap_or_default(),
                reason: format!(
                    "mirror inconsistent after sync ({} missing, {} orphaned)",
                    consistency.missing.len(),
                    consistency.orphaned.len()
                ),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
