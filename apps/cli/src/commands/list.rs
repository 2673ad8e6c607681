//! List command implementation.

use anyhow::Context;
use colored::Colorize;
use lathe_orchestrator::{ListJobsQuery, TrainingApi};
use lathe_training::{JobStatus, UserId};

use super::{print_json, status_label};

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub status: Option<String>,
    pub owner: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn execute(api: &TrainingApi, options: ListOptions, json_output: bool) -> anyhow::Result<()> {
    let status = options
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .context("Invalid --status")?;
    let query = ListJobsQuery {
        status,
        owner: options.owner.map(UserId),
        limit: options.limit,
        offset: options.offset,
    };
    let jobs = api.list_jobs(query)?;

    if json_output {
        return print_json(&jobs);
    }

    println!();
    println!("{}", format!("Training Jobs ({})", jobs.len()).bold().cyan());
    println!();

    if jobs.is_empty() {
        println!("  {}", "No training jobs found.".dimmed());
        println!();
        println!("  {}", "Tip: start one with `lathe train --dataset <id>`.".dimmed());
        return Ok(());
    }

    println!("{:<6} {:<8} {:<10} {:>9}  {:<20} {}", "ID", "Dataset", "Status", "Progress", "Created", "Model");
    println!("{}", "─".repeat(90));
    for job in jobs {
        println!(
            "{:<6} {:<8} {:<10} {:>8.1}%  {:<20} {}",
            job.id,
            job.dataset_id,
            status_label(job.status),
            job.progress,
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.model_name.as_deref().unwrap_or("-")
        );
    }
    println!();
    Ok(())
}
