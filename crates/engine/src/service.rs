//! Service manager interface and the `service(8)` adapter

use crate::runner::{Invocation, ProcessRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use strongbox_core::config::timeout_from_secs;
use strongbox_core::{BackupConfig, BackupError, Result, ServiceAction};

/// Starts and stops the processes writing to the data store.
///
/// Both operations are idempotent: stopping a stopped service is not an error.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn stop(&self, service: &str) -> Result<()>;
    async fn start(&self, service: &str) -> Result<()>;
}

/// Controls services through `<program> <service> stop|start`
#[derive(Debug, Clone)]
pub struct SysvServiceManager {
    program: PathBuf,
    runner: ProcessRunner,
}

impl SysvServiceManager {
    pub fn new(program: PathBuf, runner: ProcessRunner) -> Self {
        Self { program, runner }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(
            config.service_manager.program.clone(),
            ProcessRunner::new(timeout_from_secs(config.service_manager.timeout_secs)),
        )
    }

    pub fn invocation(&self, service: &str, action: ServiceAction) -> Invocation {
        Invocation::new(&self.program).arg(service).arg(action.to_string())
    }

    async fn control(&self, service: &str, action: ServiceAction) -> Result<()> {
        tracing::info!(service, %action, "Service control");
        self.runner
            .run(&self.invocation(service, action))
            .await
            .map(|_| ())
            .map_err(|e| BackupError::ServiceControl {
                service: service.to_string(),
                action,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ServiceManager for SysvServiceManager {
    async fn stop(&self, service: &str) -> Result<()> {
        self.control(service, ServiceAction::Stop).await
    }

    async fn start(&self, service: &str) -> Result<()> {
        self.control(service, ServiceAction::Start).await
    }
}
