//! Encrypted mirror of the snapshot store
//!
//! This crate provides:
//! - Forward sync: encrypt every segment lacking an artifact
//! - Orphan reclaim: delete every artifact whose segment is gone
//! - A consistency check between the two stores
//!
//! State is reconciled purely by comparing the two directory listings, so an
//! interrupted pass is finished by the next one without a journal.

pub mod mirror;
pub mod report;

// Re-exports
pub use mirror::{check_consistency, EncryptionMirror};
pub use report::{Consistency, ReclaimReport, SyncReport};
