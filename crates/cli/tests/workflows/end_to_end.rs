//! Successful runs over several days

use crate::common::TestSystem;
use cli_lib::PipelineState;
use engine::CaptureMode;
use strongbox_core::{SegmentKind, SegmentName};

#[tokio::test]
async fn test_full_then_incremental_then_expiry() {
    let system = TestSystem::new();

    // Day 0: first full snapshot
    let report = system.pipeline().run(CaptureMode::Full).await.unwrap();
    assert_eq!(report.state(), PipelineState::Done);
    assert_eq!(system.segments().len(), 1);
    assert_eq!(system.artifacts().len(), 1);

    // Day 1: increment on top of it
    system.advance(1);
    system.pipeline().run(CaptureMode::Incremental).await.unwrap();
    assert_eq!(system.segments().len(), 2);
    assert_eq!(system.artifacts().len(), 2);

    // Day 41: a new full; the old chain is past the 31 day limit
    system.advance(40);
    let report = system.pipeline().run(CaptureMode::Full).await.unwrap();

    let segments = system.segments();
    assert_eq!(segments.len(), 1);
    let remaining = SegmentName::parse(&segments[0]).unwrap();
    assert_eq!(remaining.kind, SegmentKind::Full);
    assert_eq!(remaining.end, system.now());

    assert_eq!(system.artifacts(), vec![format!("{}.enc", segments[0])]);
    assert_eq!(report.reclaim.unwrap().removed.len(), 2);
    assert_eq!(report.prune_plan.unwrap().expired.len(), 2);
}

#[tokio::test]
async fn test_state_sequence_and_restart() {
    let system = TestSystem::new();

    let report = system.pipeline().run(CaptureMode::Full).await.unwrap();

    assert_eq!(
        report.states,
        vec![
            PipelineState::Idle,
            PipelineState::Locked,
            PipelineState::Quiesced,
            PipelineState::Captured,
            PipelineState::Pruned,
            PipelineState::Synced,
            PipelineState::Done,
        ]
    );
    assert!(report.warnings.is_empty());
    assert_eq!(
        system.services.actions(strongbox_core::ServiceAction::Stop),
        system.config.services
    );
    assert_eq!(
        system.services.actions(strongbox_core::ServiceAction::Start),
        system.config.services
    );
}

#[tokio::test]
async fn test_scratch_removed_after_both_prunes() {
    let system = TestSystem::new();

    system.pipeline().run(CaptureMode::Full).await.unwrap();

    assert_eq!(
        system.engine.calls(),
        vec!["capture", "prune_older_than", "collapse_increments", "reclaim_scratch"]
    );
    assert!(!system.config.engine.scratch_dir.exists());
}

#[tokio::test]
async fn test_incremental_without_history_is_full() {
    let system = TestSystem::new();

    system.pipeline().run(CaptureMode::Incremental).await.unwrap();

    let segments = system.segments();
    assert_eq!(segments.len(), 1);
    assert_eq!(SegmentName::parse(&segments[0]).unwrap().kind, SegmentKind::Full);
}

#[tokio::test]
async fn test_increments_of_older_full_are_collapsed() {
    let system = TestSystem::new();

    system.pipeline().run(CaptureMode::Full).await.unwrap();
    system.advance(1);
    system.pipeline().run(CaptureMode::Incremental).await.unwrap();
    system.advance(1);
    system.pipeline().run(CaptureMode::Full).await.unwrap();

    // Both fulls are young; only the first chain's increment goes
    let kinds: Vec<SegmentKind> = system
        .segments()
        .iter()
        .map(|s| SegmentName::parse(s).unwrap().kind)
        .collect();
    assert_eq!(kinds, vec![SegmentKind::Full, SegmentKind::Full]);
    assert_eq!(system.artifacts().len(), 2);
}

#[tokio::test]
async fn test_orphaned_and_partial_artifacts_reclaimed() {
    let system = TestSystem::new();
    let layout = system.layout();
    layout.ensure_dirs().unwrap();
    let store = layout.artifact_store();
    let stale = "duplicity-full.20200101T000000Z.vol1.difftar.gz.enc";
    std::fs::write(store.join(stale), b"old").unwrap();
    std::fs::write(store.join("leftover.enc.partial"), b"EN").unwrap();

    let report = system.pipeline().run(CaptureMode::Full).await.unwrap();

    assert_eq!(report.state(), PipelineState::Done);
    assert_eq!(system.artifacts().len(), 1);
    let reclaim = report.reclaim.unwrap();
    assert_eq!(reclaim.removed.len(), 1);
    assert_eq!(reclaim.partials_removed.len(), 1);
}

#[tokio::test]
async fn test_lock_released_after_run() {
    let system = TestSystem::new();

    system.pipeline().run(CaptureMode::Full).await.unwrap();
    assert_eq!(
        cli_lib::RunLock::holder(&system.config.lock_dir, &system.config.lock_name).unwrap(),
        None
    );

    system.advance(1);
    assert!(system.pipeline().run(CaptureMode::Incremental).await.is_ok());
}
