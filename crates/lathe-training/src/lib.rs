//! Lathe Training
//!
//! Domain primitives for the training job orchestrator:
//! - The job record and its status state machine (`TrainingJob`, `JobStatus`)
//! - Hyperparameters and creation requests
//! - Collaborator contracts for datasets and principals
//! - The error taxonomy shared by every service (`JobError`)
//! - The opaque unit of training work (`Trainer`) and progress events
//! - Model artifact manifests and their on-disk layout

pub mod artifacts;
pub mod dataset;
pub mod error;
pub mod job;
pub mod layout;
pub mod principal;
pub mod progress;
pub mod trainer;

pub use artifacts::{EpochMetrics, TrainingManifest, model_artifact_name};
pub use dataset::{DatasetCatalog, DatasetId, DatasetRecord, InMemoryDatasetCatalog};
pub use error::{ErrorCode, JobError, JobResult};
pub use job::{
    HyperParameters, JobFilter, JobId, JobStatus, MAX_BATCH_SIZE, MAX_DESCRIPTION_CHARS,
    MAX_EPOCHS, NewTrainingJob, Pagination, TrainingJob, TrainingRequest,
};
pub use layout::ModelLayout;
pub use principal::{Principal, PrincipalProvider, Role, StaticPrincipal, UserId};
pub use progress::{ProgressEvent, ProgressSink};
pub use trainer::{EpochContext, EpochReport, SimulatedTrainer, Trainer};
