//! Stop dependent services around a protected region

use engine::ServiceManager;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use strongbox_core::{BackupError, Result};

/// Stops services and guarantees they are started again
pub struct QuiesceController<'a> {
    manager: &'a dyn ServiceManager,
}

/// Services stopped by a [`QuiesceController`], restarted on release
pub struct QuiesceHandle<'a> {
    manager: &'a dyn ServiceManager,
    stopped: Vec<String>,
    released: bool,
}

/// A stop failure, after the already-stopped services were restarted
#[derive(Debug)]
pub struct QuiesceFailure {
    pub cause: BackupError,
    pub restart_failures: Vec<BackupError>,
}

/// Result of a quiesced region
#[derive(Debug)]
pub struct ScopeOutcome<T> {
    /// Whether every service was stopped and the body ran
    pub quiesced: bool,
    /// Result of the body, or the stop failure that prevented it
    pub body: Result<T>,
    /// Restart failures; reported alongside `body`, never instead of it
    pub restart_failures: Vec<BackupError>,
}

impl<'a> QuiesceController<'a> {
    pub fn new(manager: &'a dyn ServiceManager) -> Self {
        Self { manager }
    }

    /// Stop every listed service in order.
    ///
    /// Any stop failure is fatal: services already stopped are started again
    /// and the failure is returned.
    pub async fn quiesce(
        &self,
        services: &[String],
    ) -> std::result::Result<QuiesceHandle<'a>, QuiesceFailure> {
        let mut handle = QuiesceHandle {
            manager: self.manager,
            stopped: Vec::with_capacity(services.len()),
            released: false,
        };

        for service in services {
            if let Err(cause) = self.manager.stop(service).await {
                tracing::error!(service = %service, "Failed to stop service: {}", cause);
                let restart_failures = handle.release().await;
                return Err(QuiesceFailure {
                    cause,
                    restart_failures,
                });
            }
            handle.stopped.push(service.clone());
        }

        tracing::info!(services = ?handle.stopped, "Services quiesced");
        Ok(handle)
    }

    /// Run `body` with the services stopped.
    ///
    /// The services are started again once the body finishes, whether it
    /// succeeded, failed or panicked. A panic is resumed after the restart.
    pub async fn scope<T, F, Fut>(&self, services: &[String], body: F) -> ScopeOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let handle = match self.quiesce(services).await {
            Ok(handle) => handle,
            Err(failure) => {
                return ScopeOutcome {
                    quiesced: false,
                    body: Err(failure.cause),
                    restart_failures: failure.restart_failures,
                }
            }
        };

        let body = AssertUnwindSafe(body()).catch_unwind().await;
        let restart_failures = handle.release().await;

        let body = match body {
            Ok(body) => body,
            Err(panic) => {
                tracing::error!(
                    restart_failures = restart_failures.len(),
                    "Quiesced region panicked; services restarted"
                );
                std::panic::resume_unwind(panic)
            }
        };

        ScopeOutcome {
            quiesced: true,
            body,
            restart_failures,
        }
    }
}

impl<'a> QuiesceHandle<'a> {
    /// Services currently held stopped
    pub fn stopped(&self) -> &[String] {
        &self.stopped
    }

    /// Start every stopped service once, in stop order, collecting failures.
    /// A failing start does not prevent the remaining ones.
    pub async fn release(mut self) -> Vec<BackupError> {
        self.released = true;
        let mut failures = Vec::new();

        for service in std::mem::take(&mut self.stopped) {
            match self.manager.start(&service).await {
                Ok(()) => tracing::info!(service = %service, "Service restarted"),
                Err(e) => {
                    tracing::error!(service = %service, "Failed to restart service: {}", e);
                    failures.push(e);
                }
            }
        }

        failures
    }
}

impl Drop for QuiesceHandle<'_> {
    fn drop(&mut self) {
        if !self.released && !self.stopped.is_empty() {
            tracing::error!(
                services = ?self.stopped,
                "Quiesce handle dropped without release; services left stopped"
            );
        }
    }
}
