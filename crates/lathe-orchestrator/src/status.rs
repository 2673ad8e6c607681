//! Read path: job records joined with the tail of their logs.

use std::fmt;
use std::sync::Arc;

use lathe_core::{JobStore, LogSink, OrchestratorConfig};
use lathe_training::{
    JobError, JobFilter, JobId, JobResult, Pagination, Principal, TrainingJob,
};
use serde::Serialize;

/// Limits applied by the status service.
#[derive(Debug, Clone)]
pub struct StatusSettings {
    /// Log lines attached to a status report.
    pub status_log_lines: usize,
    pub default_log_lines: usize,
    pub max_log_lines: usize,
    pub default_page_size: usize,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self { status_log_lines: 10, default_log_lines: 50, max_log_lines: 1000, default_page_size: 50 }
    }
}

impl StatusSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            status_log_lines: config.status_log_lines,
            default_log_lines: config.default_log_lines,
            max_log_lines: config.max_log_lines,
            default_page_size: config.default_page_size,
        }
    }
}

/// A job record with its most recent log lines.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    #[serde(flatten)]
    pub job: TrainingJob,
    pub logs: Vec<String>,
}

/// Answers status, listing and log queries.
///
/// Jobs the requester may not see are reported as not found.
pub struct StatusService {
    store: Arc<dyn JobStore>,
    logs: Arc<dyn LogSink>,
    settings: StatusSettings,
}

impl fmt::Debug for StatusService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusService").field("settings", &self.settings).finish_non_exhaustive()
    }
}

impl StatusService {
    pub fn new(store: Arc<dyn JobStore>, logs: Arc<dyn LogSink>, settings: StatusSettings) -> Self {
        Self { store, logs, settings }
    }

    pub fn settings(&self) -> &StatusSettings {
        &self.settings
    }

    pub fn get_status(&self, job_id: JobId, principal: &Principal) -> JobResult<JobStatusReport> {
        let job = self.visible_job(job_id, principal)?;
        let logs = self.logs.tail(&job.log_reference, self.settings.status_log_lines).lines();
        Ok(JobStatusReport { job, logs })
    }

    /// Lists jobs newest first.
    ///
    /// Non-admin requesters only ever see their own jobs, whatever owner the
    /// filter names.
    pub fn list_jobs(
        &self,
        filter: JobFilter,
        page: Option<Pagination>,
        principal: &Principal,
    ) -> JobResult<Vec<TrainingJob>> {
        let filter = if principal.is_admin() { filter } else { filter.with_owner(principal.id) };
        let page = page.unwrap_or_else(|| Pagination::new(self.settings.default_page_size, 0));
        if page.limit == 0 {
            return Err(JobError::Validation("limit must be at least 1".to_string()));
        }
        self.store.list(&filter, page)
    }

    /// Returns the last `lines` lines of the job log, oldest first.
    ///
    /// # Errors
    /// * `JobError::Validation` - If `lines` is outside `[1, max_log_lines]`
    /// * `JobError::JobNotFound` - If the job is missing or not visible to `principal`
    pub fn job_logs(
        &self,
        job_id: JobId,
        lines: Option<usize>,
        principal: &Principal,
    ) -> JobResult<Vec<String>> {
        let lines = lines.unwrap_or(self.settings.default_log_lines);
        if lines == 0 || lines > self.settings.max_log_lines {
            return Err(JobError::Validation(format!(
                "lines must be between 1 and {}, got {lines}",
                self.settings.max_log_lines
            )));
        }
        let job = self.visible_job(job_id, principal)?;
        Ok(self.logs.tail(&job.log_reference, lines).lines())
    }

    fn visible_job(&self, job_id: JobId, principal: &Principal) -> JobResult<TrainingJob> {
        let job = self.store.get(job_id)?;
        if principal.can_access(job.owner_id) { Ok(job) } else { Err(JobError::JobNotFound(job_id)) }
    }
}
