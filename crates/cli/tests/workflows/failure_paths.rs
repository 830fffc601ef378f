//! Runs that end in the failed state, and the ones that must not

use crate::common::{FakeCipher, FakeEngine, FakeServices, TestSystem};
use cli_lib::{PipelineState, RunLock};
use engine::CaptureMode;
use strongbox_core::{BackupError, ServiceAction};

#[tokio::test]
async fn test_capture_failure_restarts_services_once() {
    let mut system = TestSystem::new();
    system.engine = FakeEngine {
        fail_capture: true,
        ..FakeEngine::new(system.clock.clone(), system.config.engine.scratch_dir.clone())
    };

    let failure = system.pipeline().run(CaptureMode::Full).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Quiesced);
    assert!(matches!(failure.errors[..], [BackupError::SnapshotFailed(_)]));
    assert_eq!(system.services.actions(ServiceAction::Start), system.config.services);
    // No prune, no sync
    assert_eq!(system.engine.calls(), vec!["capture"]);
    assert!(system.artifacts().is_empty());
}

#[tokio::test]
async fn test_stop_failure_aborts_before_capture() {
    let mut system = TestSystem::new();
    system.services = FakeServices {
        fail_stop: Some("postfix".to_string()),
        ..Default::default()
    };

    let failure = system.pipeline().run(CaptureMode::Full).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Locked);
    assert!(matches!(
        failure.errors[..],
        [BackupError::ServiceControl { action: ServiceAction::Stop, .. }]
    ));
    assert_eq!(system.services.actions(ServiceAction::Start), vec!["dovecot".to_string()]);
    assert!(system.engine.calls().is_empty());
}

#[tokio::test]
async fn test_restart_failure_fails_run_after_sync() {
    let mut system = TestSystem::new();
    system.services = FakeServices {
        fail_start: Some("dovecot".to_string()),
        ..Default::default()
    };

    let failure = system.pipeline().run(CaptureMode::Full).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Quiesced);
    assert!(matches!(
        failure.errors[..],
        [BackupError::ServiceControl { action: ServiceAction::Start, .. }]
    ));
    // The snapshot is good, so it is still pruned and mirrored
    assert_eq!(failure.report.state(), PipelineState::Synced);
    assert_eq!(system.artifacts().len(), 1);
    // A failed start does not skip the remaining ones
    assert_eq!(system.services.actions(ServiceAction::Start), system.config.services);
}

#[tokio::test]
async fn test_prune_failure_is_not_fatal() {
    let mut system = TestSystem::new();
    system.engine = FakeEngine {
        fail_prune: true,
        ..FakeEngine::new(system.clock.clone(), system.config.engine.scratch_dir.clone())
    };

    let report = system.pipeline().run(CaptureMode::Full).await.unwrap();

    assert_eq!(report.state(), PipelineState::Done);
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings.iter().all(|w| matches!(w, BackupError::PruneFailed(_))));
    // Scratch is reclaimed even though both prunes failed
    assert_eq!(system.engine.calls().last(), Some(&"reclaim_scratch"));
    assert_eq!(system.artifacts().len(), 1);
}

#[tokio::test]
async fn test_encryption_failure_fails_in_pruned() {
    let mut system = TestSystem::new();
    system.cipher = FakeCipher { fail: true };

    let failure = system.pipeline().run(CaptureMode::Full).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Pruned);
    assert!(matches!(failure.errors[..], [BackupError::Encryption { .. }]));
    assert_eq!(system.segments().len(), 1);
    assert!(system.artifacts().is_empty());
}

#[tokio::test]
async fn test_missing_key_touches_no_service() {
    let system = TestSystem::new();
    system.remove_key();

    let failure = system.pipeline().run(CaptureMode::Full).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Locked);
    assert!(matches!(failure.errors[..], [BackupError::MissingKey(_)]));
    assert!(system.services.calls.lock().is_empty());
    assert!(system.engine.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    let system = TestSystem::new();
    let _held = RunLock::acquire(&system.config.lock_dir, &system.config.lock_name).unwrap();

    let failure = system.pipeline().run(CaptureMode::Full).await.unwrap_err();

    assert_eq!(failure.state, PipelineState::Idle);
    match &failure.errors[..] {
        [BackupError::AlreadyRunning { pid, .. }] => assert_eq!(*pid, std::process::id()),
        other => panic!("expected AlreadyRunning, got {:?}", other),
    }
    assert!(system.services.calls.lock().is_empty());
    assert!(system.engine.calls().is_empty());
}

#[tokio::test]
async fn test_failed_run_is_repaired_by_next_run() {
    let mut system = TestSystem::new();
    system.cipher = FakeCipher { fail: true };
    system.pipeline().run(CaptureMode::Full).await.unwrap_err();

    system.cipher = FakeCipher::default();
    system.advance(1);
    let report = system.pipeline().run(CaptureMode::Incremental).await.unwrap();

    assert_eq!(report.state(), PipelineState::Done);
    assert_eq!(system.segments().len(), 2);
    assert_eq!(system.artifacts().len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unlistable_segment_never_reaches_done() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let system = TestSystem::new();
    let store = system.layout().snapshot_store();
    std::fs::create_dir_all(&store).unwrap();
    std::fs::write(store.join(OsStr::from_bytes(b"seg\xff")), b"plaintext").unwrap();

    let failure = system.pipeline().run(CaptureMode::Full).await.unwrap_err();

    assert_ne!(failure.report.state(), PipelineState::Done);
    assert!(matches!(failure.errors[..], [BackupError::Io { .. }, ..]));
    assert_eq!(system.services.actions(ServiceAction::Start), system.config.services);
    assert!(system.artifacts().is_empty());
}
