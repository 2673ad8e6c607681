//! Command implementations for the Lathe CLI.

pub mod datasets;
pub mod list;
pub mod logs;
pub mod predict;
pub mod recover;
pub mod status;
pub mod stop;
pub mod train;

use colored::{ColoredString, Colorize};
use lathe_training::JobStatus;
use serde::Serialize;

/// Status name colored by outcome.
pub fn status_label(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Pending => status.as_str().yellow(),
        JobStatus::Running => status.as_str().cyan(),
        JobStatus::Completed => status.as_str().green(),
        JobStatus::Failed => status.as_str().red(),
        JobStatus::Stopped => status.as_str().dimmed(),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
