//! Background execution of a single training job.
//!
//! A runner owns one job from Pending to a terminal status. Between epochs it
//! writes a checkpoint (progress plus one log line), and each checkpoint write
//! doubles as the cancellation poll: if the job was stopped meanwhile, the
//! write is rejected and the runner exits without touching the record again.
//!
//! While a runner is alive it is the only writer of its job's log. A stop
//! request made in the same process is handed over as a [`StopNotice`] and
//! the runner writes the stop line itself.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use lathe_core::{JobStore, LogSink, OrchestratorConfig};
use lathe_training::{
    EpochContext, EpochMetrics, JobError, JobId, JobResult, JobStatus, ModelLayout,
    ProgressEvent, ProgressSink, Trainer, TrainingJob, TrainingManifest, UserId,
    model_artifact_name,
};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::lifecycle::JobLifecycle;

/// How a runner ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// A stop request was observed.
    Stopped,
    /// The runner exited without reaching a terminal status it could record.
    Abandoned,
}

/// Who asked a job to stop, shared between the scheduler and the job's runner.
#[derive(Debug, Clone, Default)]
pub struct StopNotice(Arc<OnceLock<UserId>>);

impl StopNotice {
    /// Records the requester. Only the first request is kept.
    pub fn record(&self, user: UserId) {
        let _ = self.0.set(user);
    }

    #[must_use]
    pub fn requested_by(&self) -> Option<UserId> {
        self.0.get().copied()
    }
}

/// Timing knobs for runners.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Wait before the Pending -> Running write.
    pub start_delay: Duration,
    /// Back-off before the single retry of a failed status or checkpoint write.
    pub checkpoint_retry_delay: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(1),
            checkpoint_retry_delay: Duration::from_millis(100),
        }
    }
}

impl RunnerSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            start_delay: config.runner_start_delay(),
            checkpoint_retry_delay: config.checkpoint_retry_delay(),
        }
    }
}

/// Executes training jobs against the store, the log sink and a trainer.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    lifecycle: JobLifecycle,
    logs: Arc<dyn LogSink>,
    trainer: Arc<dyn Trainer>,
    progress: Arc<dyn ProgressSink>,
    layout: ModelLayout,
    settings: RunnerSettings,
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("trainer", &self.trainer.id())
            .field("layout", &self.layout)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        logs: Arc<dyn LogSink>,
        trainer: Arc<dyn Trainer>,
        progress: Arc<dyn ProgressSink>,
        layout: ModelLayout,
        settings: RunnerSettings,
    ) -> Self {
        let lifecycle = JobLifecycle::new(Arc::clone(&store));
        Self { store, lifecycle, logs, trainer, progress, layout, settings }
    }

    /// Runs the job to a terminal status.
    ///
    /// Waits for a slot in `slots` before moving the job to Running, so jobs
    /// beyond the concurrency limit stay Pending. Never panics on storage
    /// failures; they are logged and end the run.
    pub async fn run(&self, job_id: JobId, slots: Arc<Semaphore>, notice: &StopNotice) -> RunOutcome {
        if !self.settings.start_delay.is_zero() {
            tokio::time::sleep(self.settings.start_delay).await;
        }

        let job = match self.store.get(job_id) {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Runner could not load job");
                return RunOutcome::Abandoned;
            }
        };
        if job.status != JobStatus::Pending {
            return self.exit_early(&job, notice);
        }

        let Ok(_permit) = slots.acquire_owned().await else {
            error!(job_id = %job_id, "Runner slots closed before job could start");
            return RunOutcome::Abandoned;
        };

        let job = match self.persist(job_id, "start", || self.lifecycle.start(job_id)).await {
            Ok(job) => job,
            Err(e) => return self.on_write_error(&job, "start", e, notice),
        };
        info!(job_id = %job_id, dataset_id = %job.dataset_id, epochs = job.hyperparameters.epochs, "Training started");
        self.log_entry(
            &job,
            &format!(
                "Training started: dataset={}, epochs={}, learning_rate={}, batch_size={}",
                job.dataset_id,
                job.hyperparameters.epochs,
                job.hyperparameters.learning_rate,
                job.hyperparameters.batch_size
            ),
        );
        self.progress.on_event(ProgressEvent::Started { job_id });

        self.train(&job, notice).await
    }

    async fn train(&self, job: &TrainingJob, notice: &StopNotice) -> RunOutcome {
        let total = job.hyperparameters.epochs;
        let mut metrics = Vec::with_capacity(total as usize);

        for epoch in 1..=total {
            let ctx = EpochContext {
                job_id: job.id,
                dataset_id: job.dataset_id,
                epoch,
                total_epochs: total,
                hyperparameters: job.hyperparameters,
            };
            let report = match self.trainer.train_epoch(&ctx).await {
                Ok(report) => report,
                Err(e) => {
                    error!(job_id = %job.id, epoch, error = %e, "Training epoch failed");
                    return self.fail(job, &e.to_string(), notice);
                }
            };
            metrics.push(EpochMetrics { epoch, loss: report.loss });

            let progress = f64::from(epoch) * 100.0 / f64::from(total);
            if let Err(e) = self
                .persist(job.id, "checkpoint", || self.lifecycle.checkpoint(job.id, progress))
                .await
            {
                return self.on_write_error(job, "checkpoint", e, notice);
            }
            self.log_entry(
                job,
                &format!(
                    "Epoch {epoch}/{total} completed, loss={:.4}, progress={progress:.1}%",
                    report.loss
                ),
            );
            self.progress.on_event(ProgressEvent::Checkpoint {
                job_id: job.id,
                epoch,
                total_epochs: total,
                progress,
            });
        }

        self.finish(job, metrics, notice).await
    }

    async fn finish(
        &self,
        job: &TrainingJob,
        metrics: Vec<EpochMetrics>,
        notice: &StopNotice,
    ) -> RunOutcome {
        let now = Utc::now();
        let name = model_artifact_name(job.dataset_id, job.id, now);
        let manifest = TrainingManifest {
            job_id: job.id,
            dataset_id: job.dataset_id,
            model_artifact_name: name.clone(),
            trainer: self.trainer.id().to_string(),
            hyperparameters: job.hyperparameters,
            metrics,
            created_at: now,
        };
        if let Err(e) = manifest.write(&self.layout) {
            error!(job_id = %job.id, model = %name, error = %e, "Failed to save model artifact");
            return self.fail(job, &format!("could not save model {name}: {e}"), notice);
        }

        match self.persist(job.id, "completion", || self.lifecycle.complete(job.id, &name)).await {
            Ok(_) => {
                info!(job_id = %job.id, model = %name, final_loss = ?manifest.final_loss(), "Training completed");
                self.log_entry(job, &format!("Training completed. Model saved as {name}"));
                self.progress
                    .on_event(ProgressEvent::Finished { job_id: job.id, status: JobStatus::Completed });
                RunOutcome::Completed
            }
            Err(e) => {
                // The job never became Completed, so no record points at the artifact.
                if let Err(io) = std::fs::remove_dir_all(self.layout.model_dir(&name)) {
                    debug!(job_id = %job.id, model = %name, error = %io, "Could not remove orphaned model");
                }
                self.on_write_error(job, "completion", e, notice)
            }
        }
    }

    /// Runs a store write, retrying once after a back-off if it hits a storage error.
    async fn persist<F>(&self, job_id: JobId, stage: &str, op: F) -> JobResult<TrainingJob>
    where
        F: Fn() -> JobResult<TrainingJob> + Send + Sync,
    {
        match op() {
            Err(e) if e.is_storage() => {
                warn!(job_id = %job_id, stage, error = %e, "Job write failed, retrying once");
                tokio::time::sleep(self.settings.checkpoint_retry_delay).await;
                op()
            }
            result => result,
        }
    }

    fn on_write_error(
        &self,
        job: &TrainingJob,
        stage: &str,
        err: JobError,
        notice: &StopNotice,
    ) -> RunOutcome {
        match err {
            JobError::InvalidTransition { from: JobStatus::Stopped, .. } => {
                info!(job_id = %job.id, stage, "Stop request observed, runner exiting");
                self.stopped(job, notice)
            }
            e if e.is_storage() => {
                error!(job_id = %job.id, stage, error = %e, "Job write failed after retry");
                self.fail(job, &format!("{stage} could not be saved: {e}"), notice)
            }
            e => {
                error!(job_id = %job.id, stage, error = %e, "Unexpected job state, runner exiting");
                RunOutcome::Abandoned
            }
        }
    }

    fn exit_early(&self, job: &TrainingJob, notice: &StopNotice) -> RunOutcome {
        if job.status == JobStatus::Stopped {
            info!(job_id = %job.id, "Job stopped before its runner started");
            self.stopped(job, notice)
        } else {
            warn!(job_id = %job.id, status = %job.status, "Runner found job not Pending, exiting");
            RunOutcome::Abandoned
        }
    }

    /// Marks the job Failed, then records the reason in the job log.
    ///
    /// If the Failed write itself fails, the job is left as is and the error
    /// only reaches the operational log.
    fn fail(&self, job: &TrainingJob, reason: &str, notice: &StopNotice) -> RunOutcome {
        match self.lifecycle.fail(job.id) {
            Ok(_) => {
                let message = format!("Training failed: {reason}");
                self.log_entry(job, &message);
                self.progress.on_event(ProgressEvent::Message { job_id: job.id, message });
                self.progress
                    .on_event(ProgressEvent::Finished { job_id: job.id, status: JobStatus::Failed });
                RunOutcome::Failed
            }
            Err(JobError::InvalidTransition { from: JobStatus::Stopped, .. }) => {
                info!(job_id = %job.id, reason, "Job was stopped before the failure was recorded");
                self.stopped(job, notice)
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Could not mark job failed");
                RunOutcome::Abandoned
            }
        }
    }

    fn stopped(&self, job: &TrainingJob, notice: &StopNotice) -> RunOutcome {
        if let Some(user) = notice.requested_by() {
            self.log_entry(job, &format!("Training stopped by user {user}"));
        }
        self.progress.on_event(ProgressEvent::Finished { job_id: job.id, status: JobStatus::Stopped });
        RunOutcome::Stopped
    }

    fn log_entry(&self, job: &TrainingJob, text: &str) {
        if let Err(e) = self.logs.append_entry(&job.log_reference, text) {
            warn!(job_id = %job.id, error = %e, "Failed to write job log");
        }
    }
}
