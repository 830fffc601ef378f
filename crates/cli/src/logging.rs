//! Tracing subscriber setup

use anyhow::{Context, Result};
use strongbox_core::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Log file prefix inside the configured directory
pub const LOG_FILE_NAME: &str = "strongbox.log";

/// Level selected by the `-v` count, falling back to the configured level
pub fn level_for(config: &LoggingConfig, verbose: u8) -> String {
    match verbose {
        0 => config.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber.
///
/// Logs always go to stderr. With `directory` configured they are also
/// appended to a daily rolling file; the returned guard must be held until
/// exit so buffered lines are flushed.
pub fn init(config: &LoggingConfig, verbose: u8) -> Result<Option<WorkerGuard>> {
    let level = level_for(config, verbose);
    let filter = || {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&level))
    };

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter().context("Invalid log level")?);

    let (file, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter().context("Invalid log level")?);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}
