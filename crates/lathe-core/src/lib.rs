//! Lathe Core
//!
//! Persistence and configuration for the training job orchestrator:
//! - SQLite-backed job records (`storage`)
//! - Per-job append-only log files (`logs`)
//! - Layered TOML configuration (`config`)

pub mod config;
pub mod logs;
pub mod storage;

pub use config::{ConfigError, ConfigResult, DatasetConfig, OrchestratorConfig};
pub use logs::{FsLogSink, LogSink, LogTail};
pub use storage::{
    Database, JobMutator, JobStore, LogReferenceFn, SqliteJobStore, StorageError, StorageResult,
};

/// Log reference for a job: `training_job_<id>.log`.
#[must_use]
pub fn log_reference(id: lathe_training::JobId) -> String {
    format!("training_job_{id}.log")
}
