//! Shared utilities for CLI commands

use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format an age as "3 days ago"
pub fn format_age(age: Duration) -> String {
    let seconds = age.as_secs();

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format a timestamp as "2024-01-03 14:30:00"
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Total size of the regular files directly inside `dir`
pub fn store_size(dir: &Path, files: impl IntoIterator<Item = impl AsRef<str>>) -> u64 {
    files
        .into_iter()
        .filter_map(|name| std::fs::metadata(dir.join(name.as_ref())).ok())
        .map(|meta| meta.len())
        .sum()
}
