//! Adapters for the external collaborators of the backup pipeline
//!
//! This crate provides:
//! - A process runner with an optional watchdog timeout
//! - The snapshot engine interface and its duplicity adapter
//! - The service manager interface and its `service(8)` adapter
//! - The cipher interface and its openssl adapter
//!
//! The pipeline only depends on the traits; command syntax stays here.

pub mod cipher;
pub mod runner;
pub mod service;
pub mod snapshot;

// Re-exports
pub use cipher::{Cipher, OpensslCipher};
pub use runner::{Invocation, ProcessRunner, RunFailure};
pub use service::{ServiceManager, SysvServiceManager};
pub use snapshot::{CaptureMode, CaptureRequest, DuplicityEngine, SnapshotEngine};
