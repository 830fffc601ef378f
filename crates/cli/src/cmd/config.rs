//! Print the effective configuration

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use strongbox_core::BackupConfig;

pub fn run(config: &BackupConfig, path: &Path) -> Result<()> {
    let text = config
        .to_toml_string()
        .context("Failed to render configuration")?;

    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };

    println!("{}: {}\n", "Location".dimmed(), source.dimmed());
    println!("{}", text);
    Ok(())
}
