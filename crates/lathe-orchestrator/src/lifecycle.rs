//! Job lifecycle transitions.
//!
//! Every status change is applied inside a single atomic store update, and the
//! transition is checked against the status read in that same update. A Stop
//! recorded between a runner's last read and its next write therefore makes
//! the runner's write fail with `InvalidTransition { from: Stopped, .. }`
//! instead of overwriting it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lathe_core::JobStore;
use lathe_training::{JobError, JobId, JobResult, JobStatus, TrainingJob};
use tracing::{debug, warn};

/// Moves `job` to `to`, stamping `completed_at` on terminal statuses.
pub fn transition(job: &mut TrainingJob, to: JobStatus, now: DateTime<Utc>) -> JobResult<()> {
    if !job.status.can_transition_to(to) {
        return Err(JobError::InvalidTransition { from: job.status, to });
    }
    job.status = to;
    if to.is_terminal() {
        job.completed_at = Some(now);
    }
    Ok(())
}

/// Pending -> Running. Keeps an existing `started_at`.
pub fn mark_running(job: &mut TrainingJob, now: DateTime<Utc>) -> JobResult<()> {
    transition(job, JobStatus::Running, now)?;
    job.started_at.get_or_insert(now);
    Ok(())
}

/// Records a checkpoint on a Running job.
///
/// Progress is clamped to `[0, 100]` and never moves backwards.
pub fn record_progress(job: &mut TrainingJob, progress: f64) -> JobResult<()> {
    if job.status != JobStatus::Running {
        return Err(JobError::InvalidTransition { from: job.status, to: JobStatus::Running });
    }
    job.progress = job.progress.max(progress.clamp(0.0, 100.0));
    Ok(())
}

/// Running -> Completed with the produced artifact.
pub fn mark_completed(
    job: &mut TrainingJob,
    model_artifact_name: &str,
    now: DateTime<Utc>,
) -> JobResult<()> {
    transition(job, JobStatus::Completed, now)?;
    job.progress = 100.0;
    job.model_artifact_name = Some(model_artifact_name.to_string());
    Ok(())
}

/// Running -> Failed.
pub fn mark_failed(job: &mut TrainingJob, now: DateTime<Utc>) -> JobResult<()> {
    transition(job, JobStatus::Failed, now)
}

/// Pending/Running -> Stopped.
///
/// Returns `false` without touching a job that is already terminal.
pub fn request_stop(job: &mut TrainingJob, now: DateTime<Utc>) -> JobResult<bool> {
    if job.is_terminal() {
        return Ok(false);
    }
    transition(job, JobStatus::Stopped, now)?;
    Ok(true)
}

/// Applies lifecycle transitions to stored jobs.
#[derive(Clone)]
pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
}

impl fmt::Debug for JobLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobLifecycle").finish_non_exhaustive()
    }
}

impl JobLifecycle {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    fn apply(
        &self,
        job_id: JobId,
        to: JobStatus,
        mutator: &mut (dyn FnMut(&mut TrainingJob) -> JobResult<()> + Send),
    ) -> JobResult<TrainingJob> {
        match self.store.update(job_id, mutator) {
            Ok(job) => {
                debug!(job_id = %job_id, to = ?to, progress = job.progress, "State transition");
                Ok(job)
            }
            Err(e @ JobError::InvalidTransition { .. }) => {
                debug!(job_id = %job_id, to = ?to, error = %e, "Transition rejected");
                Err(e)
            }
            Err(e) => {
                warn!(job_id = %job_id, to = ?to, error = %e, "Transition write failed");
                Err(e)
            }
        }
    }

    pub fn start(&self, job_id: JobId) -> JobResult<TrainingJob> {
        self.apply(job_id, JobStatus::Running, &mut |job| mark_running(job, Utc::now()))
    }

    pub fn checkpoint(&self, job_id: JobId, progress: f64) -> JobResult<TrainingJob> {
        self.apply(job_id, JobStatus::Running, &mut |job| record_progress(job, progress))
    }

    pub fn complete(&self, job_id: JobId, model_artifact_name: &str) -> JobResult<TrainingJob> {
        self.apply(job_id, JobStatus::Completed, &mut |job| {
            mark_completed(job, model_artifact_name, Utc::now())
        })
    }

    pub fn fail(&self, job_id: JobId) -> JobResult<TrainingJob> {
        self.apply(job_id, JobStatus::Failed, &mut |job| mark_failed(job, Utc::now()))
    }

    /// Records a stop request.
    ///
    /// Returns the job as stored afterwards and whether this call stopped it.
    pub fn stop(&self, job_id: JobId) -> JobResult<(TrainingJob, bool)> {
        let mut stopped = false;
        let job = self.apply(job_id, JobStatus::Stopped, &mut |job| {
            stopped = request_stop(job, Utc::now())?;
            Ok(())
        })?;
        Ok((job, stopped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lathe_training::{DatasetId, HyperParameters, UserId};

    fn job(status: JobStatus) -> TrainingJob {
        TrainingJob {
            id: JobId(1),
            dataset_id: DatasetId(1),
            owner_id: UserId(1),
            status,
            progress: 0.0,
            hyperparameters: HyperParameters::default(),
            description: None,
            model_artifact_name: None,
            log_reference: "training_job_1.log".to_string(),
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_mark_running_sets_started_at() {
        let mut j = job(JobStatus::Pending);
        mark_running(&mut j, Utc::now()).unwrap();
        assert_eq!(j.status, JobStatus::Running);
        assert!(j.started_at.is_some());
        assert!(j.completed_at.is_none());
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut j = job(JobStatus::Running);
        record_progress(&mut j, 40.0).unwrap();
        record_progress(&mut j, 20.0).unwrap();
        assert!((j.progress - 40.0).abs() < f64::EPSILON);
        record_progress(&mut j, 250.0).unwrap();
        assert!((j.progress - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_requires_running() {
        let mut j = job(JobStatus::Stopped);
        assert!(matches!(
            record_progress(&mut j, 50.0),
            Err(JobError::InvalidTransition { from: JobStatus::Stopped, .. })
        ));
    }

    #[test]
    fn test_completion_sets_artifact() {
        let mut j = job(JobStatus::Running);
        mark_completed(&mut j, "model_1_1_0", Utc::now()).unwrap();
        assert_eq!(j.status, JobStatus::Completed);
        assert!((j.progress - 100.0).abs() < f64::EPSILON);
        assert!(j.completed_at.is_some());
        assert!(j.check_invariants().is_ok());
    }

    #[test]
    fn test_stopped_job_cannot_complete() {
        let mut j = job(JobStatus::Running);
        assert!(request_stop(&mut j, Utc::now()).unwrap());
        let stopped_at = j.completed_at;

        assert!(matches!(
            mark_completed(&mut j, "model_1_1_0", Utc::now()),
            Err(JobError::InvalidTransition { from: JobStatus::Stopped, to: JobStatus::Completed })
        ));
        assert_eq!(j.completed_at, stopped_at);
        assert!(j.model_artifact_name.is_none());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut j = job(JobStatus::Failed);
        j.completed_at = Some(Utc::now());
        let before = j.clone();
        assert!(!request_stop(&mut j, Utc::now()).unwrap());
        assert_eq!(j, before);
    }

    #[test]
    fn test_pending_cannot_fail() {
        let mut j = job(JobStatus::Pending);
        assert!(mark_failed(&mut j, Utc::now()).is_err());
    }
}
