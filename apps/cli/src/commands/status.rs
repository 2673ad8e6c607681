//! Status command implementation.

use colored::Colorize;
use lathe_orchestrator::{JobStatusResponse, TrainingApi};
use lathe_training::JobId;

use super::{print_json, status_label};

/// Execute the status command.
///
/// Shows the job record and its most recent log lines.
pub fn execute(api: &TrainingApi, job: i64, json_output: bool) -> anyhow::Result<()> {
    let status = api.get_job_status(JobId(job))?;
    if json_output {
        return print_json(&status);
    }
    print_status(&status);
    Ok(())
}

pub fn print_status(status: &JobStatusResponse) {
    println!();
    println!("{}", format!("Training Job {}", status.job_id).bold().cyan());
    println!();
    println!("  Status:        {}", status_label(status.status));
    println!("  Progress:      {:.1}%", status.progress);
    println!("  Dataset:       {}", status.dataset_id);
    println!(
        "  Parameters:    epochs={}, learning_rate={}, batch_size={}",
        status.epochs, status.learning_rate, status.batch_size
    );
    if let Some(description) = &status.description {
        println!("  Description:   {description}");
    }
    if let Some(started) = status.started_at {
        println!("  Started:       {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(completed) = status.completed_at {
        println!("  Finished:      {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(model) = &status.model_name {
        println!("  Model:         {}", model.green());
    }

    println!();
    println!("{}", "Recent log:".bold());
    if status.logs.is_empty() {
        println!("  {}", "(empty)".dimmed());
    }
    for line in &status.logs {
        println!("  {}", line.dimmed());
    }
    println!();
}
