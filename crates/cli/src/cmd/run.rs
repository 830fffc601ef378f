//! Execute one backup run

use crate::pipeline::{Pipeline, PipelineFailure, RunReport};
use anyhow::Result;
use engine::{CaptureMode, DuplicityEngine, OpensslCipher, SysvServiceManager};
use owo_colors::OwoColorize;
use strongbox_core::BackupConfig;

pub async fn run(config: &BackupConfig, mode: CaptureMode) -> Result<()> {
    let engine = DuplicityEngine::from_config(config);
    let services = SysvServiceManager::from_config(config);
    let cipher = OpensslCipher::from_config(config);

    let pipeline = Pipeline::new(config, &engine, &services, &cipher);

    match pipeline.run(mode).await {
        Ok(report) => {
            print_report(&report);
            println!("{} {} backup complete", "✓".green(), report.mode);
            Ok(())
        }
        Err(failure) => {
            print_failure(&failure);
            anyhow::bail!("{}", failure)
        }
    }
}

fn print_report(report: &RunReport) {
    println!("{} {}", "Run".bold(), report.run_id.to_string().dimmed());

    if let Some(plan) = &report.prune_plan {
        if plan.removes_anything() {
            println!(
                "  Pruned:      {} expired, {} collapsed",
                plan.expired.len(),
                plan.collapsed.len()
            );
        }
    }

    if let Some(sync) = &report.sync {
        println!(
            "  Encrypted:   {} new, {} already present",
            sync.encrypted.len(),
            sync.already_present
        );
    }

    if let Some(reclaim) = &report.reclaim {
        let removed = reclaim.removed.len() + reclaim.partials_removed.len();
        if removed > 0 {
            println!("  Reclaimed:   {} artifacts", removed);
        }
    }

    for warning in &report.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

fn print_failure(failure: &PipelineFailure) {
    print_report(&failure.report);
    eprintln!(
        "{} backup failed in state {}",
        "✗".red(),
        failure.state.to_string().yellow()
    );
    for error in &failure.errors {
        eprintln!("  {} {}", "error:".red(), error);
    }
}
