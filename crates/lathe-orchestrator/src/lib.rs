//! Lathe Orchestrator
//!
//! Runs training jobs in the background and answers questions about them:
//! - Lifecycle transitions checked inside atomic store updates (`lifecycle`)
//! - One runner task per job, with cooperative cancellation (`runner`)
//! - Job creation, stop requests and runner tracking (`scheduler`)
//! - Status, listing and log queries (`status`)
//! - Best-effort progress broadcast (`progress`)
//! - Component wiring from configuration (`service`)
//! - The caller-facing API boundary (`api`)

pub mod api;
pub mod lifecycle;
pub mod progress;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod status;

pub use api::{
    ApiError, ApiResult, JobActionResponse, JobLogsResponse, JobStatusResponse, JobSummary,
    ListJobsQuery, NO_LOGS_LINE, TrainingApi,
};
pub use lifecycle::JobLifecycle;
pub use progress::{ProgressMetrics, ProgressReporter};
pub use runner::{JobRunner, RunOutcome, RunnerSettings, StopNotice};
pub use scheduler::{JobScheduler, RecoveryReport};
pub use service::{Orchestrator, OrchestratorBuilder};
pub use status::{JobStatusReport, StatusService, StatusSettings};
