//! CLI command implementations

pub mod config;
pub mod decrypt;
pub mod run;
pub mod status;
