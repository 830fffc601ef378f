//! Shared types for the strongbox backup pipeline
//!
//! This crate provides:
//! - The error taxonomy every pipeline component reports through
//! - Configuration loading and validation
//! - The on-disk backup layout (snapshot store, encrypted mirror, key)
//! - Snapshot segment naming and store scanning
//! - Key material handling

pub mod config;
pub mod error;
pub mod key;
pub mod layout;
pub mod segment;

// Re-exports
pub use config::{
    BackupConfig, CipherConfig, EngineConfig, LoggingConfig, RetentionConfig, ServiceManagerConfig,
};
pub use error::{BackupError, ServiceAction};
pub use key::KeyMaterial;
pub use layout::BackupLayout;
pub use segment::{scan_store, SegmentKind, SegmentName, Snapshot, SnapshotId, StoreScan};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, BackupError>;
