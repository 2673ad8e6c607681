//! Logs command implementation.

use lathe_orchestrator::TrainingApi;
use lathe_training::JobId;

/// Prints the last `lines` log lines, oldest first.
pub fn execute(api: &TrainingApi, job: i64, lines: Option<usize>) -> anyhow::Result<()> {
    let response = api.get_job_logs(JobId(job), lines)?;
    for line in &response.lines {
        println!("{line}");
    }
    Ok(())
}
