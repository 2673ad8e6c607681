//! Wiring of the store, log sink, trainer and services from configuration.

use std::fmt;
use std::sync::Arc;

use lathe_core::{FsLogSink, JobStore, LogSink, OrchestratorConfig, SqliteJobStore};
use lathe_models::{CacheConfig, ManifestModelLoader, ModelCache, PredictionService};
use lathe_training::{
    DatasetCatalog, JobError, JobResult, ModelLayout, ProgressSink, SimulatedTrainer, Trainer,
};
use tracing::info;

use crate::progress::ProgressReporter;
use crate::runner::{JobRunner, RunnerSettings};
use crate::scheduler::JobScheduler;
use crate::status::{StatusService, StatusSettings};

/// All orchestrator services sharing one store and one log directory.
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn JobStore>,
    scheduler: JobScheduler,
    status: StatusService,
    predictions: PredictionService,
    reporter: Arc<ProgressReporter>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Builds every service from `config` with the default components.
    pub fn open(config: OrchestratorConfig) -> JobResult<Self> {
        OrchestratorBuilder::new(config).build()
    }

    pub fn builder(config: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn status(&self) -> &StatusService {
        &self.status
    }

    pub fn predictions(&self) -> &PredictionService {
        &self.predictions
    }

    pub fn reporter(&self) -> &Arc<ProgressReporter> {
        &self.reporter
    }
}

/// Builds an [`Orchestrator`], letting callers replace individual components.
///
/// Unset components default to: a SQLite store at `database_path`, the
/// catalog from the `datasets` config entries, and a simulated trainer with
/// `epoch_delay_ms` per epoch.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    store: Option<Arc<dyn JobStore>>,
    datasets: Option<Arc<dyn DatasetCatalog>>,
    trainer: Option<Arc<dyn Trainer>>,
    logs: Option<Arc<dyn LogSink>>,
}

impl OrchestratorBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config, store: None, datasets: None, trainer: None, logs: None }
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn datasets(mut self, datasets: Arc<dyn DatasetCatalog>) -> Self {
        self.datasets = Some(datasets);
        self
    }

    #[must_use]
    pub fn trainer(mut self, trainer: Arc<dyn Trainer>) -> Self {
        self.trainer = Some(trainer);
        self
    }

    #[must_use]
    pub fn logs(mut self, logs: Arc<dyn LogSink>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn build(self) -> JobResult<Orchestrator> {
        let config = self.config;
        config.validate().map_err(|e| JobError::Validation(e.to_string()))?;

        let store: Arc<dyn JobStore> = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteJobStore::open(&config.database_path)?),
        };
        let datasets: Arc<dyn DatasetCatalog> = match self.datasets {
            Some(datasets) => datasets,
            None => Arc::new(config.dataset_catalog()),
        };
        let trainer: Arc<dyn Trainer> = match self.trainer {
            Some(trainer) => trainer,
            None => Arc::new(SimulatedTrainer::new(config.epoch_delay())),
        };
        let logs: Arc<dyn LogSink> = match self.logs {
            Some(logs) => logs,
            None => Arc::new(FsLogSink::new(&config.log_dir)?),
        };

        let layout = ModelLayout::new(&config.model_dir);
        let reporter = Arc::new(ProgressReporter::new());
        let runner = JobRunner::new(
            Arc::clone(&store),
            Arc::clone(&logs),
            trainer,
            Arc::clone(&reporter) as Arc<dyn ProgressSink>,
            layout.clone(),
            RunnerSettings::from_config(&config),
        );
        let scheduler = JobScheduler::new(
            Arc::clone(&store),
            datasets,
            Arc::clone(&logs),
            runner,
            config.max_concurrent_jobs,
        );
        let status = StatusService::new(
            Arc::clone(&store),
            Arc::clone(&logs),
            StatusSettings::from_config(&config),
        );
        let cache = ModelCache::new(CacheConfig::with_capacity(config.model_cache_size))
            .map_err(|e| JobError::Validation(e.to_string()))?;
        let predictions = PredictionService::new(
            Arc::clone(&store),
            cache,
            Arc::new(ManifestModelLoader::new(layout)),
        );

        info!(
            database = %config.database_path.display(),
            log_dir = %config.log_dir.display(),
            model_dir = %config.model_dir.display(),
            max_concurrent_jobs = config.max_concurrent_jobs,
            "Orchestrator ready"
        );
        Ok(Orchestrator { config, store, scheduler, status, predictions, reporter })
    }
}
