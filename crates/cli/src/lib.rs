//! Strongbox backup CLI library
//!
//! The binary in `main.rs` is a thin clap front end; everything it runs
//! lives here so integration tests can drive the pipeline directly.

pub mod cmd;
pub mod locks;
pub mod logging;
pub mod pipeline;
pub mod quiesce;
pub mod util;

pub use locks::RunLock;
pub use pipeline::{Pipeline, PipelineFailure, PipelineState, RunReport};
pub use quiesce::{QuiesceController, QuiesceHandle, ScopeOutcome};
