//! Stop command implementation.

use colored::Colorize;
use lathe_orchestrator::TrainingApi;
use lathe_training::{JobId, JobStatus};

use super::{print_json, status_label};

pub async fn execute(api: &TrainingApi, job: i64, json_output: bool) -> anyhow::Result<()> {
    let response = api.stop_job(JobId(job)).await?;
    if json_output {
        return print_json(&response);
    }

    if response.status == JobStatus::Stopped {
        println!("{} {}", "Stopped training job".bold(), response.job_id.to_string().cyan());
    } else {
        println!(
            "Training job {} already finished: {}",
            response.job_id.to_string().cyan(),
            status_label(response.status)
        );
    }
    Ok(())
}
