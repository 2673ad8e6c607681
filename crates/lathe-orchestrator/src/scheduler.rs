//! Job creation, runner launch and stop requests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use lathe_core::{JobStore, LogSink, log_reference};
use lathe_training::{
    DatasetCatalog, JobError, JobFilter, JobId, JobResult, JobStatus, NewTrainingJob, Pagination,
    Principal, TrainingJob, TrainingRequest,
};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::lifecycle::JobLifecycle;
use crate::runner::{JobRunner, RunOutcome, StopNotice};

struct TrackedRunner {
    generation: u64,
    handle: JoinHandle<RunOutcome>,
    notice: StopNotice,
}

/// What [`JobScheduler::recover`] did with jobs left over from a previous process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Pending jobs that were given a new runner.
    pub resumed: Vec<JobId>,
    /// Running jobs whose runner was lost, now Failed.
    pub failed: Vec<JobId>,
}

/// Validates training requests and owns the runner tasks.
///
/// At most one runner task exists per job id. Finished tasks remove
/// themselves; [`JobScheduler::shutdown`] joins whatever is left.
pub struct JobScheduler {
    store: Arc<dyn JobStore>,
    datasets: Arc<dyn DatasetCatalog>,
    logs: Arc<dyn LogSink>,
    lifecycle: JobLifecycle,
    runner: Arc<JobRunner>,
    slots: Arc<Semaphore>,
    runners: Arc<Mutex<HashMap<JobId, TrackedRunner>>>,
    generation: AtomicU64,
}

impl fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobScheduler")
            .field("available_slots", &self.slots.available_permits())
            .field("runner_count", &self.runners.try_lock().map(|r| r.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl JobScheduler {
    /// Creates a scheduler that lets at most `max_concurrent_jobs` runners
    /// past Pending at once.
    pub fn new(
        store: Arc<dyn JobStore>,
        datasets: Arc<dyn DatasetCatalog>,
        logs: Arc<dyn LogSink>,
        runner: JobRunner,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            lifecycle: JobLifecycle::new(Arc::clone(&store)),
            store,
            datasets,
            logs,
            runner: Arc::new(runner),
            slots: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            runners: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Creates a Pending job and schedules its runner.
    ///
    /// Returns as soon as the record exists; training happens in the background.
    ///
    /// # Errors
    /// * `JobError::DatasetNotFound` - If the dataset is missing or not visible to `principal`
    /// * `JobError::Validation` - If the hyperparameters or description are invalid
    pub async fn start(
        &self,
        request: TrainingRequest,
        principal: &Principal,
    ) -> JobResult<TrainingJob> {
        let dataset = match self.datasets.get_dataset(request.dataset_id) {
            Ok(dataset) if principal.can_access(dataset.owner_id) => dataset,
            Ok(_) => {
                debug!(dataset_id = %request.dataset_id, user = %principal.id, "Dataset not owned by requester");
                return Err(JobError::DatasetNotFound(request.dataset_id));
            }
            Err(e) => return Err(e),
        };
        request.validate()?;

        let job = self.store.create(
            NewTrainingJob {
                dataset_id: dataset.id,
                owner_id: dataset.owner_id,
                hyperparameters: request.hyperparameters,
                description: request.normalized_description(),
                created_at: Utc::now(),
            },
            &log_reference,
        )?;
        self.log_entry(
            &job,
            &format!("Training job created for dataset {} ({})", dataset.id, dataset.file_reference),
        );

        self.launch(job.id).await?;
        info!(job_id = %job.id, dataset_id = %job.dataset_id, user = %principal.id, "Training job scheduled");
        Ok(job)
    }

    /// Spawns the runner task for `job_id`.
    ///
    /// # Errors
    /// * `JobError::AlreadyRunning` - If a live runner already exists for the job
    pub async fn launch(&self, job_id: JobId) -> JobResult<()> {
        let mut runners = self.runners.lock().await;
        if runners.get(&job_id).is_some_and(|r| !r.handle.is_finished()) {
            return Err(JobError::AlreadyRunning(job_id));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let runner = Arc::clone(&self.runner);
        let slots = Arc::clone(&self.slots);
        let registry = Arc::clone(&self.runners);
        let notice = StopNotice::default();
        let runner_notice = notice.clone();
        let handle = tokio::spawn(async move {
            let outcome = runner.run(job_id, slots, &runner_notice).await;
            let mut runners = registry.lock().await;
            if runners.get(&job_id).is_some_and(|r| r.generation == generation) {
                runners.remove(&job_id);
            }
            debug!(job_id = %job_id, outcome = ?outcome, "Runner finished");
            outcome
        });
        runners.insert(job_id, TrackedRunner { generation, handle, notice });
        Ok(())
    }

    /// Records a stop request.
    ///
    /// The store shows Stopped as soon as this returns; the runner notices at
    /// its next checkpoint and writes the stop line to the job log. Without a
    /// live runner in this process the line is written here. Stopping a job
    /// that is already terminal changes nothing and returns it as is.
    ///
    /// # Errors
    /// * `JobError::JobNotFound` - If the job is missing or not visible to `principal`
    pub async fn stop(&self, job_id: JobId, principal: &Principal) -> JobResult<TrainingJob> {
        let job = self.store.get(job_id)?;
        if !principal.can_access(job.owner_id) {
            return Err(JobError::JobNotFound(job_id));
        }

        // The notice must be in place before the store says Stopped.
        let notice = self.live_notice(job_id).await;
        if let Some(notice) = &notice {
            notice.record(principal.id);
        }

        let (job, stopped) = self.lifecycle.stop(job_id)?;
        if stopped {
            if notice.is_none() {
                self.log_entry(&job, &format!("Training stopped by user {}", principal.id));
            }
            info!(job_id = %job_id, user = %principal.id, "Training job stopped");
        } else {
            debug!(job_id = %job_id, status = %job.status, "Stop requested for finished job");
        }
        Ok(job)
    }

    /// Ids of jobs whose runner task is still alive.
    pub async fn active_jobs(&self) -> Vec<JobId> {
        let runners = self.runners.lock().await;
        let mut ids: Vec<JobId> = runners
            .iter()
            .filter(|(_, r)| !r.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    async fn live_notice(&self, job_id: JobId) -> Option<StopNotice> {
        let runners = self.runners.lock().await;
        runners.get(&job_id).filter(|r| !r.handle.is_finished()).map(|r| r.notice.clone())
    }

    pub async fn is_active(&self, job_id: JobId) -> bool {
        self.runners.lock().await.get(&job_id).is_some_and(|r| !r.handle.is_finished())
    }

    /// Waits for every tracked runner to finish.
    pub async fn shutdown(&self) {
        let runners: Vec<(JobId, TrackedRunner)> = self.runners.lock().await.drain().collect();
        info!(count = runners.len(), "Waiting for training runners");
        for (job_id, tracked) in runners {
            match tracked.handle.await {
                Ok(outcome) => debug!(job_id = %job_id, outcome = ?outcome, "Runner joined"),
                Err(e) => error!(job_id = %job_id, error = %e, "Runner task panicked"),
            }
        }
    }

    /// Reconciles jobs left behind by a previous process.
    ///
    /// Running jobs without a live runner are marked Failed; Pending jobs are
    /// given a runner, oldest first. Run it only while no other process has
    /// runners on the same store, since the failure line assumes the job's
    /// runner is gone.
    pub async fn recover(&self) -> JobResult<RecoveryReport> {
        let everything = Pagination::new(usize::MAX, 0);
        let mut report = RecoveryReport::default();

        let running =
            self.store.list(&JobFilter::default().with_status(JobStatus::Running), everything)?;
        for job in running {
            if self.is_active(job.id).await {
                continue;
            }
            match self.lifecycle.fail(job.id) {
                Ok(_) => {
                    self.log_entry(
                        &job,
                        "Training failed: runner lost before completion (process restart)",
                    );
                    warn!(job_id = %job.id, "Marked orphaned running job as failed");
                    report.failed.push(job.id);
                }
                Err(e) => error!(job_id = %job.id, error = %e, "Could not mark orphaned job failed"),
            }
        }

        let mut pending =
            self.store.list(&JobFilter::default().with_status(JobStatus::Pending), everything)?;
        pending.reverse();
        for job in pending {
            match self.launch(job.id).await {
                Ok(()) => report.resumed.push(job.id),
                Err(JobError::AlreadyRunning(_)) => {}
                Err(e) => return Err(e),
            }
        }

        info!(resumed = report.resumed.len(), failed = report.failed.len(), "Recovery finished");
        Ok(report)
    }

    fn log_entry(&self, job: &TrainingJob, text: &str) {
        if let Err(e) = self.logs.append_entry(&job.log_reference, text) {
            warn!(job_id = %job.id, error = %e, "Failed to write job log");
        }
    }
}
