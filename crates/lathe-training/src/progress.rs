use crate::job::{JobId, JobStatus};
use serde::{Deserialize, Serialize};

/// Best-effort notifications emitted by a runner.
///
/// These are not durable: the job store and log are the record of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: JobId },
    Checkpoint { job_id: JobId, epoch: u32, total_epochs: u32, progress: f64 },
    Message { job_id: JobId, message: String },
    Finished { job_id: JobId, status: JobStatus },
}

impl ProgressEvent {
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Started { job_id }
            | Self::Checkpoint { job_id, .. }
            | Self::Message { job_id, .. }
            | Self::Finished { job_id, .. } => *job_id,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}
