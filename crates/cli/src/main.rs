//! Strongbox CLI - strongbox command

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli_lib::{cmd, logging};
use engine::CaptureMode;
use std::path::PathBuf;
use strongbox_core::config::DEFAULT_CONFIG_PATH;
use strongbox_core::BackupConfig;

/// Strongbox - quiesced, encrypted snapshots of a mail data store
#[derive(Parser)]
#[command(name = "strongbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Capture a full snapshot instead of an increment
    #[arg(long)]
    full: bool,

    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show snapshot chains, mirror state and the run lock
    Status,
    /// Print the effective configuration
    Config,
    /// Decrypt one artifact from the encrypted mirror
    Decrypt {
        /// Encrypted artifact
        artifact: PathBuf,
        /// Where to write the plaintext segment
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BackupConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    // Held until exit so the file writer flushes
    let _log_guard = logging::init(&config.logging, cli.verbose)?;

    match cli.command {
        None => {
            let mode = if cli.full {
                CaptureMode::Full
            } else {
                CaptureMode::Incremental
            };
            cmd::run::run(&config, mode).await
        }
        Some(Commands::Status) => cmd::status::run(&config).await,
        Some(Commands::Config) => cmd::config::run(&config, &cli.config),
        Some(Commands::Decrypt { artifact, output }) => {
            cmd::decrypt::run(&config, &artifact, &output).await
        }
    }
}
