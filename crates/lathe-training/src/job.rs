use crate::dataset::DatasetId;
use crate::error::{JobError, JobResult};
use crate::principal::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier for a training job, assigned by the job store.
///
/// Ids increase monotonically, so ordering by id is ordering by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a training job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for its runner.
    Pending,
    /// A runner is executing epochs.
    Running,
    /// All epochs finished and a model artifact was produced.
    Completed,
    /// Execution or checkpointing failed.
    Failed,
    /// A stop request was recorded.
    Stopped,
}

impl JobStatus {
    pub const ALL: [Self; 5] =
        [Self::Pending, Self::Running, Self::Completed, Self::Failed, Self::Stopped];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Completed, Failed and Stopped have no outgoing edges.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Checks if the job can move to the given status.
    ///
    /// Self-transitions are not edges; a checkpoint that keeps a job Running
    /// does not go through this check.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running | Self::Stopped)
                | (Self::Running, Self::Completed | Self::Failed | Self::Stopped)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            other => Err(JobError::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

pub const MIN_EPOCHS: u32 = 1;
pub const MAX_EPOCHS: u32 = 50;
pub const MIN_BATCH_SIZE: u32 = 1;
pub const MAX_BATCH_SIZE: u32 = 128;
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Training hyperparameters, fixed once the job is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParameters {
    pub epochs: u32,
    pub learning_rate: f64,
    pub batch_size: u32,
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self { epochs: 3, learning_rate: 2e-5, batch_size: 8 }
    }
}

impl HyperParameters {
    pub fn validate(&self) -> JobResult<()> {
        if !(MIN_EPOCHS..=MAX_EPOCHS).contains(&self.epochs) {
            return Err(JobError::Validation(format!(
                "epochs must be between {MIN_EPOCHS} and {MAX_EPOCHS}, got {}",
                self.epochs
            )));
        }
        if !self.learning_rate.is_finite()
            || self.learning_rate <= 0.0
            || self.learning_rate > 1.0
        {
            return Err(JobError::Validation(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(JobError::Validation(format!(
                "batch_size must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

/// A request to start training, as received from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub hyperparameters: HyperParameters,
    #[serde(default)]
    pub description: Option<String>,
}

impl TrainingRequest {
    #[must_use]
    pub fn new(dataset_id: DatasetId, hyperparameters: HyperParameters) -> Self {
        Self { dataset_id, hyperparameters, description: None }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checks the hyperparameters and the description length.
    pub fn validate(&self) -> JobResult<()> {
        self.hyperparameters.validate()?;
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_CHARS {
                return Err(JobError::Validation(format!(
                    "description must be at most {MAX_DESCRIPTION_CHARS} characters"
                )));
            }
        }
        Ok(())
    }

    /// The description with surrounding whitespace removed; blank becomes `None`.
    #[must_use]
    pub fn normalized_description(&self) -> Option<String> {
        self.description.as_deref().map(str::trim).filter(|d| !d.is_empty()).map(str::to_string)
    }
}

/// Everything the store needs to insert a fresh Pending record.
#[derive(Debug, Clone)]
pub struct NewTrainingJob {
    pub dataset_id: DatasetId,
    pub owner_id: UserId,
    pub hyperparameters: HyperParameters,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The durable record of one training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub id: JobId,
    pub dataset_id: DatasetId,
    pub owner_id: UserId,
    pub status: JobStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub hyperparameters: HyperParameters,
    pub description: Option<String>,
    /// Set only once the job is Completed.
    pub model_artifact_name: Option<String>,
    pub log_reference: String,
    pub started_at: Option<DateTime<Utc>>,
    /// Set iff the status is terminal.
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TrainingJob {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Checks the record-level invariants that tie fields to the status.
    pub fn check_invariants(&self) -> JobResult<()> {
        if !(0.0..=100.0).contains(&self.progress) {
            return Err(JobError::Validation(format!(
                "job {} progress {} out of range",
                self.id, self.progress
            )));
        }
        if self.status.is_terminal() != self.completed_at.is_some() {
            return Err(JobError::Validation(format!(
                "job {} is {} but completed_at is {}",
                self.id,
                self.status,
                if self.completed_at.is_some() { "set" } else { "unset" }
            )));
        }
        if (self.status == JobStatus::Completed) != self.model_artifact_name.is_some() {
            return Err(JobError::Validation(format!(
                "job {} is {} but model_artifact_name is {}",
                self.id,
                self.status,
                if self.model_artifact_name.is_some() { "set" } else { "unset" }
            )));
        }
        Ok(())
    }
}

/// Listing filter; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub owner: Option<UserId>,
}

impl JobFilter {
    #[must_use]
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Offset pagination over a newest-first listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { limit: 50, offset: 0 }
    }
}

impl Pagination {
    #[must_use]
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}
