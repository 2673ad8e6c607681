//! Recover command implementation.

use colored::Colorize;
use lathe_orchestrator::TrainingApi;

/// Reconciles jobs from a previous process, then waits for resumed jobs.
///
/// Only run this when no other `lathe train` process is alive: its running
/// jobs would be marked failed.
pub async fn execute(api: &TrainingApi) -> anyhow::Result<()> {
    let scheduler = api.orchestrator().scheduler();
    let report = scheduler.recover().await?;

    for id in &report.failed {
        println!("  {} {}", "Marked failed:".red(), id);
    }
    for id in &report.resumed {
        println!("  {} {}", "Resumed:".cyan(), id);
    }
    if report.failed.is_empty() && report.resumed.is_empty() {
        println!("  {}", "Nothing to recover.".dimmed());
        return Ok(());
    }

    scheduler.shutdown().await;
    println!("{}", "Recovery finished.".bold());
    Ok(())
}
