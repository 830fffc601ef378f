//! Show snapshot chains, mirror state and the run lock

use crate::locks::RunLock;
use crate::util;
use anyhow::{Context, Result};
use chrono::Utc;
use owo_colors::OwoColorize;
use retention::{build_chains, RetentionPolicy};
use std::collections::HashMap;
use strongbox_core::segment::list_files;
use strongbox_core::{scan_store, BackupConfig, KeyMaterial, SnapshotId};

pub async fn run(config: &BackupConfig) -> Result<()> {
    let layout = config.layout();
    let now = Utc::now();

    println!("{}", "Backup Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    println!("Data store:    {}", config.storage_root.display().to_string().cyan());
    println!("Backup dir:    {}", layout.backup_dir().display().to_string().cyan());
    println!();

    // Run lock
    print!("Run lock:      ");
    match RunLock::holder(&config.lock_dir, &config.lock_name) {
        Ok(Some(pid)) => println!("{} (pid {})", "Running".green(), pid),
        Ok(None) => println!("{}", "Idle".dimmed()),
        Err(e) => println!("{} ({})", "Unknown".yellow(), e),
    }

    // Key
    print!("Key:           ");
    match KeyMaterial::open(layout.key_file()) {
        Ok(key) => println!("{}", key.path().display()),
        Err(_) => println!("{} {}", "Missing".red(), layout.key_file().display()),
    }
    println!();

    // Snapshot chains
    let scan = scan_store(&layout.snapshot_store()).context("Failed to scan snapshot store")?;
    let chains = build_chains(&scan.snapshots);
    let sizes: HashMap<SnapshotId, u64> = scan.snapshots.iter().map(|s| (s.id, s.size)).collect();
    let total: u64 = sizes.values().sum();
    let describe = |id: SnapshotId| {
        format!(
            "{} {} ({})",
            util::format_time(id.end),
            util::format_size(sizes.get(&id).copied().unwrap_or(0)).dimmed(),
            util::format_age((now - id.end).to_std().unwrap_or_default()).dimmed()
        )
    };

    println!(
        "Snapshots:     {} in {} chain(s), {}",
        scan.snapshots.len(),
        chains.len(),
        util::format_size(total)
    );
    for chain in &chains {
        match chain.base {
            Some(base) => println!("  {} {}", "full".yellow(), describe(base)),
            None => println!("  {} base removed", "headless".red()),
        }
        for inc in &chain.increments {
            println!("    {} {}", "inc".cyan(), describe(*inc));
        }
    }
    if !scan.unrecognised.is_empty() {
        println!("  {} {} unrecognised file(s)", "note:".dimmed(), scan.unrecognised.len());
    }

    // What the next run would prune
    let policy = RetentionPolicy::from_config(&config.retention);
    match policy.plan(&scan.snapshots, now) {
        Ok(plan) if plan.removes_anything() => println!(
            "  Next prune:  {} expired, {} collapsed",
            plan.expired.len(),
            plan.collapsed.len()
        ),
        Ok(_) => {}
        Err(e) => println!("  {} {}", "warning:".yellow(), e),
    }
    println!();

    // Encrypted mirror
    let artifact_store = layout.artifact_store();
    let artifacts = list_files(&artifact_store).context("Failed to list artifact store")?;
    let consistency = mirror::check_consistency(&layout.snapshot_store(), &artifact_store)
        .context("Failed to compare stores")?;

    println!(
        "Mirror:        {} artifact(s), {}",
        artifacts.len(),
        util::format_size(util::store_size(&artifact_store, &artifacts))
    );
    if consistency.is_consistent() {
        println!("  {}", "In sync ✓".green());
    } else {
        println!(
            "  {} {} missing, {} orphaned",
            "Out of sync:".yellow(),
            consistency.missing.len(),
            consistency.orphaned.len()
        );
        println!("  {}", "Tip: the next run reconciles both".dimmed());
    }

    Ok(())
}
