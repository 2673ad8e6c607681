use crate::dataset::DatasetId;
use crate::job::{JobId, JobStatus};
use thiserror::Error;

pub type JobResult<T> = std::result::Result<T, JobError>;

/// Errors surfaced by the orchestrator services.
///
/// Validation, not-found and permission errors are returned synchronously to
/// callers. Execution errors are caught by the runner and only become visible
/// through the job's status and log.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("dataset {0} not found")]
    DatasetNotFound(DatasetId),

    #[error("training job {0} not found")]
    JobNotFound(JobId),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("training step failed: {0}")]
    Execution(String),

    #[error("training job {0} already has an active runner")]
    AlreadyRunning(JobId),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Stable numeric codes exposed at the API boundary.
///
/// 10xxx general, 20xxx datasets, 30xxx training, 40xxx models, 50xxx system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidParams,
    PermissionDenied,
    DatasetNotFound,
    TrainingFailed,
    TrainingNotFound,
    TrainingAlreadyRunning,
    InvalidTransition,
    ModelNotFound,
    DatabaseError,
}

impl ErrorCode {
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            Self::InvalidParams => 10001,
            Self::PermissionDenied => 10003,
            Self::DatasetNotFound => 20001,
            Self::TrainingFailed => 30001,
            Self::TrainingNotFound => 30002,
            Self::TrainingAlreadyRunning => 30003,
            Self::InvalidTransition => 30004,
            Self::ModelNotFound => 40001,
            Self::DatabaseError => 50001,
        }
    }
}

impl JobError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::InvalidParams,
            Self::DatasetNotFound(_) => ErrorCode::DatasetNotFound,
            Self::JobNotFound(_) => ErrorCode::TrainingNotFound,
            Self::ModelNotFound(_) => ErrorCode::ModelNotFound,
            Self::Permission(_) => ErrorCode::PermissionDenied,
            Self::Storage(_) => ErrorCode::DatabaseError,
            Self::Execution(_) => ErrorCode::TrainingFailed,
            Self::AlreadyRunning(_) => ErrorCode::TrainingAlreadyRunning,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        }
    }

    /// True for errors that come from the durable store rather than the request.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(JobError::Validation("x".into()).code().as_u32(), 10001);
        assert_eq!(JobError::DatasetNotFound(DatasetId(999)).code().as_u32(), 20001);
        assert_eq!(JobError::JobNotFound(JobId(7)).code().as_u32(), 30002);
        assert_eq!(JobError::Storage("disk".into()).code().as_u32(), 50001);
        assert_eq!(
            JobError::InvalidTransition { from: JobStatus::Completed, to: JobStatus::Running }
                .code()
                .as_u32(),
            30004
        );
    }

    #[test]
    fn test_messages() {
        let err = JobError::InvalidTransition { from: JobStatus::Stopped, to: JobStatus::Running };
        assert_eq!(err.to_string(), "invalid status transition stopped -> running");
        assert_eq!(JobError::JobNotFound(JobId(3)).to_string(), "training job 3 not found");
    }
}
