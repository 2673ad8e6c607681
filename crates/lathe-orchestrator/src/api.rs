//! API boundary.
//!
//! Translates service results into serializable responses and stable
//! `(code, message)` errors. No orchestration logic lives here.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lathe_models::{PredictionRequest, PredictionResult};
use lathe_training::{
    DatasetId, JobError, JobFilter, JobId, JobStatus, Pagination, Principal, PrincipalProvider,
    TrainingJob, TrainingRequest, UserId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::service::Orchestrator;

/// Line returned in place of an absent or empty job log.
pub const NO_LOGS_LINE: &str = "no logs yet";

/// Error as seen by API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("[{code}] {message}")]
pub struct ApiError {
    pub code: u32,
    pub message: String,
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        Self { code: err.code().as_u32(), message: err.to_string() }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Reply to create and stop calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobActionResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub dataset_id: DatasetId,
    pub status: JobStatus,
    pub progress: f64,
    pub epochs: u32,
    pub learning_rate: f64,
    pub batch_size: u32,
    pub description: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub model_name: Option<String>,
    pub logs: Vec<String>,
}

/// One row of a job listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub dataset_id: DatasetId,
    pub status: JobStatus,
    pub progress: f64,
    pub description: Option<String>,
    pub model_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<TrainingJob> for JobSummary {
    fn from(job: TrainingJob) -> Self {
        Self {
            id: job.id,
            dataset_id: job.dataset_id,
            status: job.status,
            progress: job.progress,
            description: job.description,
            model_name: job.model_artifact_name,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobLogsResponse {
    pub job_id: JobId,
    pub lines: Vec<String>,
}

/// Listing parameters; unset fields use the configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub status: Option<JobStatus>,
    /// Honored for admins only.
    #[serde(default)]
    pub owner: Option<UserId>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Entry point for callers, acting as the current principal.
#[derive(Clone)]
pub struct TrainingApi {
    orchestrator: Arc<Orchestrator>,
    principals: Arc<dyn PrincipalProvider>,
}

impl fmt::Debug for TrainingApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingApi")
            .field("principal", &self.principals.current_principal())
            .finish_non_exhaustive()
    }
}

impl TrainingApi {
    pub fn new(orchestrator: Arc<Orchestrator>, principals: Arc<dyn PrincipalProvider>) -> Self {
        Self { orchestrator, principals }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn principal(&self) -> Principal {
        self.principals.current_principal()
    }

    pub async fn create_training_job(
        &self,
        request: TrainingRequest,
    ) -> ApiResult<JobActionResponse> {
        let principal = self.principals.current_principal();
        let job = self.orchestrator.scheduler().start(request, &principal).await?;
        Ok(JobActionResponse {
            job_id: job.id,
            status: job.status,
            message: "Training job created".to_string(),
        })
    }

    pub fn get_job_status(&self, job_id: JobId) -> ApiResult<JobStatusResponse> {
        let principal = self.principals.current_principal();
        let report = self.orchestrator.status().get_status(job_id, &principal)?;
        let job = report.job;
        Ok(JobStatusResponse {
            job_id: job.id,
            dataset_id: job.dataset_id,
            status: job.status,
            progress: job.progress,
            epochs: job.hyperparameters.epochs,
            learning_rate: job.hyperparameters.learning_rate,
            batch_size: job.hyperparameters.batch_size,
            description: job.description,
            started_at: job.started_at,
            completed_at: job.completed_at,
            model_name: job.model_artifact_name,
            logs: report.logs,
        })
    }

    /// Stops the job. Stopping a finished job returns its current status.
    pub async fn stop_job(&self, job_id: JobId) -> ApiResult<JobActionResponse> {
        let principal = self.principals.current_principal();
        let job = self.orchestrator.scheduler().stop(job_id, &principal).await?;
        let message = if job.status == JobStatus::Stopped {
            "Training job stopped".to_string()
        } else {
            format!("Training job already {}", job.status)
        };
        Ok(JobActionResponse { job_id: job.id, status: job.status, message })
    }

    pub fn list_jobs(&self, query: ListJobsQuery) -> ApiResult<Vec<JobSummary>> {
        let principal = self.principals.current_principal();
        let filter = JobFilter { status: query.status, owner: query.owner };
        let page = match (query.limit, query.offset) {
            (None, None) => None,
            (limit, offset) => Some(Pagination::new(
                limit.unwrap_or(self.orchestrator.config().default_page_size),
                offset.unwrap_or(0),
            )),
        };
        let jobs = self.orchestrator.status().list_jobs(filter, page, &principal)?;
        Ok(jobs.into_iter().map(JobSummary::from).collect())
    }

    /// Returns the last `lines` log lines, or a single placeholder line when
    /// the job has not logged anything yet.
    pub fn get_job_logs(&self, job_id: JobId, lines: Option<usize>) -> ApiResult<JobLogsResponse> {
        let principal = self.principals.current_principal();
        let mut lines = self.orchestrator.status().job_logs(job_id, lines, &principal)?;
        if lines.is_empty() {
            lines.push(NO_LOGS_LINE.to_string());
        }
        Ok(JobLogsResponse { job_id, lines })
    }

    pub fn predict(&self, text: &str, model_job_id: Option<JobId>) -> ApiResult<PredictionResult> {
        let principal = self.principals.current_principal();
        let request = PredictionRequest { text: text.to_string(), model_job_id };
        Ok(self.orchestrator.predictions().predict(&request, &principal)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_from_job_error() {
        let err = ApiError::from(JobError::DatasetNotFound(DatasetId(999)));
        assert_eq!(err.code, 20001);
        assert_eq!(err.message, "dataset 999 not found");
        assert_eq!(err.to_string(), "[20001] dataset 999 not found");

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 20001);
    }

    #[test]
    fn test_summary_from_job() {
        let now = Utc::now();
        let job = TrainingJob {
            id: JobId(3),
            dataset_id: DatasetId(1),
            owner_id: UserId(1),
            status: JobStatus::Completed,
            progress: 100.0,
            hyperparameters: lathe_training::HyperParameters::default(),
            description: Some("baseline".to_string()),
            model_artifact_name: Some("model_1_3_0".to_string()),
            log_reference: "training_job_3.log".to_string(),
            started_at: Some(now),
            completed_at: Some(now),
            created_at: now,
        };
        let summary = JobSummary::from(job);
        assert_eq!(summary.model_name.as_deref(), Some("model_1_3_0"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["id"], 3);
    }
}
