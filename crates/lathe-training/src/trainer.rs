use crate::dataset::DatasetId;
use crate::error::JobResult;
use crate::job::{HyperParameters, JobId};
use async_trait::async_trait;
use std::time::Duration;

/// Inputs for one epoch of work.
#[derive(Debug, Clone)]
pub struct EpochContext {
    pub job_id: JobId,
    pub dataset_id: DatasetId,
    /// 1-based.
    pub epoch: u32,
    pub total_epochs: u32,
    pub hyperparameters: HyperParameters,
}

/// What an epoch produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub loss: f64,
}

/// The numeric training algorithm, seen by the runner as an opaque unit of work.
///
/// The runner calls `train_epoch` once per epoch and checkpoints between
/// calls; implementations cannot be interrupted mid-epoch.
#[async_trait]
pub trait Trainer: Send + Sync {
    fn id(&self) -> &'static str;

    /// Runs one epoch. An `Err` fails the job.
    async fn train_epoch(&self, ctx: &EpochContext) -> JobResult<EpochReport>;
}

/// Stand-in trainer that sleeps for each epoch and reports a decaying loss.
#[derive(Debug, Clone)]
pub struct SimulatedTrainer {
    epoch_delay: Duration,
}

impl SimulatedTrainer {
    #[must_use]
    pub fn new(epoch_delay: Duration) -> Self {
        Self { epoch_delay }
    }
}

impl Default for SimulatedTrainer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Trainer for SimulatedTrainer {
    fn id(&self) -> &'static str {
        "simulated"
    }

    async fn train_epoch(&self, ctx: &EpochContext) -> JobResult<EpochReport> {
        if !self.epoch_delay.is_zero() {
            tokio::time::sleep(self.epoch_delay).await;
        }
        // Larger learning rates converge faster in the simulation.
        let rate = 1.0 + ctx.hyperparameters.learning_rate * 100.0;
        let loss = 2.5 / (f64::from(ctx.epoch) * rate + 1.0);
        Ok(EpochReport { loss })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_loss_decreases() {
        let trainer = SimulatedTrainer::new(Duration::ZERO);
        let mut ctx = EpochContext {
            job_id: JobId(1),
            dataset_id: DatasetId(1),
            epoch: 1,
            total_epochs: 3,
            hyperparameters: HyperParameters::default(),
        };

        let first = trainer.train_epoch(&ctx).await.unwrap();
        ctx.epoch = 3;
        let last = trainer.train_epoch(&ctx).await.unwrap();
        assert!(last.loss < first.loss);
        assert_eq!(trainer.id(), "simulated");
    }
}
