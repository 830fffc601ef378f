//! Snapshot retention decisions
//!
//! This crate provides:
//! - Chain reconstruction from the snapshot store's member set
//! - The retention policy (age cutoff + incremental collapse)
//! - Prune plans handed to the snapshot engine
//!
//! Nothing here touches the filesystem.

pub mod chain;
pub mod policy;

// Re-exports
pub use chain::{build_chains, Chain};
pub use policy::{collapse_increments, expire_by_age, PruneInstruction, PrunePlan, RetentionPolicy};
