//! Training command implementation.

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use lathe_orchestrator::TrainingApi;
use lathe_training::{DatasetId, HyperParameters, JobId, ProgressEvent, TrainingRequest};
use tokio::sync::broadcast::error::RecvError;

use super::{print_json, status_label};
use crate::commands::status::print_status;

/// How often the store is checked in case a progress event was missed.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub dataset: i64,
    pub epochs: u32,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub description: Option<String>,
}

/// Execute the train command.
///
/// Creates the job, then follows it until it reaches a terminal status.
/// Ctrl-C records a stop request and keeps following until the runner exits.
pub async fn execute(api: &TrainingApi, options: TrainOptions, json_output: bool) -> Result<()> {
    let mut events = api.orchestrator().reporter().subscribe();

    let mut request = TrainingRequest::new(
        DatasetId(options.dataset),
        HyperParameters {
            epochs: options.epochs,
            learning_rate: options.learning_rate,
            batch_size: options.batch_size,
        },
    );
    request.description = options.description;

    let created = api.create_training_job(request).await?;
    let job_id = created.job_id;
    if !json_output {
        println!(
            "{} {} (dataset {}, {} epochs)",
            "Created training job".bold(),
            job_id.to_string().cyan(),
            options.dataset,
            options.epochs
        );
    }

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let mut stop_requested = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if event.job_id() == job_id => {
                    if !json_output {
                        print_event(&event);
                    }
                    if matches!(event, ProgressEvent::Finished { .. }) {
                        break;
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = poll.tick() => {
                if finished(api, job_id).await? {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c(), if !stop_requested => {
                signal?;
                stop_requested = true;
                let stopped = api.stop_job(job_id).await?;
                if !json_output {
                    println!("{} ({})", "Stop requested".yellow(), stopped.message);
                }
            }
        }
    }

    // The runner writes its last log line after the terminal status.
    api.orchestrator().scheduler().shutdown().await;
    let status = api.get_job_status(job_id)?;
    if json_output {
        return print_json(&status);
    }
    print_status(&status);
    Ok(())
}

/// True once the job is terminal or its runner is gone.
async fn finished(api: &TrainingApi, job_id: JobId) -> Result<bool> {
    let status = api.get_job_status(job_id)?;
    Ok(status.status.is_terminal() || !api.orchestrator().scheduler().is_active(job_id).await)
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Started { .. } => println!("  {}", "Training started".cyan()),
        ProgressEvent::Checkpoint { epoch, total_epochs, progress, .. } => {
            println!("  Epoch {epoch}/{total_epochs} {}", format!("{progress:.1}%").dimmed());
        }
        ProgressEvent::Message { message, .. } => println!("  {message}"),
        ProgressEvent::Finished { status, .. } => println!("  Finished: {}", status_label(*status)),
    }
}
