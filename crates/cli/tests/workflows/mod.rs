//! Workflow integration tests
//!
//! Complete pipeline runs against fake collaborators, validating the
//! on-disk result and the order of side effects.

pub mod end_to_end;
pub mod failure_paths;
