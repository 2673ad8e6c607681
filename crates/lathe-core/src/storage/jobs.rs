//! Durable training job records.
//!
//! The store is the single source of truth for a job's status, progress and
//! artifact name. Runners, the scheduler and status readers share it and never
//! hold their own copies of a record across an await point.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use lathe_training::{
    DatasetId, HyperParameters, JobError, JobFilter, JobId, JobResult, JobStatus, NewTrainingJob,
    Pagination, TrainingJob, UserId,
};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, Transaction, params, params_from_iter};
use tracing::{debug, info};

use crate::storage::database::Database;
use crate::storage::error::StorageError;

/// Builds a job's log reference from its freshly assigned id.
pub type LogReferenceFn<'a> = &'a (dyn Fn(JobId) -> String + Sync);

/// In-place edit applied to a record inside a single atomic update.
pub type JobMutator<'a> = &'a mut (dyn FnMut(&mut TrainingJob) -> JobResult<()> + Send);

/// Persistence for training jobs.
///
/// Every method is atomic with respect to the other methods on the same job.
pub trait JobStore: Send + Sync {
    /// Inserts a Pending record and assigns its id and log reference.
    fn create(&self, job: NewTrainingJob, log_reference: LogReferenceFn<'_>)
    -> JobResult<TrainingJob>;

    /// # Errors
    /// * `JobError::JobNotFound` - If no record has this id
    fn get(&self, id: JobId) -> JobResult<TrainingJob>;

    /// Reads, mutates and writes back one record atomically.
    ///
    /// If the mutator returns an error nothing is written and that error is
    /// returned unchanged. Only the mutable fields (status, progress,
    /// artifact name, timestamps) are persisted.
    fn update(&self, id: JobId, mutator: JobMutator<'_>) -> JobResult<TrainingJob>;

    /// Lists matching records, newest first.
    fn list(&self, filter: &JobFilter, page: Pagination) -> JobResult<Vec<TrainingJob>>;
}

const SELECT_COLUMNS: &str = "SELECT id, dataset_id, owner_id, status, progress, epochs, \
     learning_rate, batch_size, description, model_artifact_name, log_reference, \
     started_at, completed_at, created_at FROM training_jobs";

/// Parses an RFC3339 timestamp column.
fn parse_timestamp(row: &Row, idx: usize, column_name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let timestamp_str: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&timestamp_str).map(|dt| dt.with_timezone(&Utc)).map_err(|_| {
        rusqlite::Error::InvalidColumnType(
            idx,
            column_name.to_string(),
            rusqlite::types::Type::Text,
        )
    })
}

fn parse_optional_timestamp(
    row: &Row,
    idx: usize,
    column_name: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(idx)?;
    match value {
        Some(_) => parse_timestamp(row, idx, column_name).map(Some),
        None => Ok(None),
    }
}

fn parse_status(row: &Row, idx: usize) -> rusqlite::Result<JobStatus> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, "status".to_string(), rusqlite::types::Type::Text)
    })
}

fn job_from_row(row: &Row) -> rusqlite::Result<TrainingJob> {
    Ok(TrainingJob {
        id: JobId(row.get(0)?),
        dataset_id: DatasetId(row.get(1)?),
        owner_id: UserId(row.get(2)?),
        status: parse_status(row, 3)?,
        progress: row.get(4)?,
        hyperparameters: HyperParameters {
            epochs: row.get(5)?,
            learning_rate: row.get(6)?,
            batch_size: row.get(7)?,
        },
        description: row.get(8)?,
        model_artifact_name: row.get(9)?,
        log_reference: row.get(10)?,
        started_at: parse_optional_timestamp(row, 11, "started_at")?,
        completed_at: parse_optional_timestamp(row, 12, "completed_at")?,
        created_at: parse_timestamp(row, 13, "created_at")?,
    })
}

fn load(tx: &Transaction<'_>, id: JobId) -> JobResult<TrainingJob> {
    tx.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id.0], job_from_row)
        .optional()
        .map_err(StorageError::from)?
        .ok_or(JobError::JobNotFound(id))
}

/// SQLite implementation of [`JobStore`].
///
/// Cloning shares the underlying connection.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteJobStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> JobResult<Self> {
        let db = Database::open(path)?;
        Ok(Self::new(Arc::new(Mutex::new(db))))
    }

    pub fn open_in_memory() -> JobResult<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::new(Arc::new(Mutex::new(db))))
    }

    fn lock(&self) -> JobResult<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|e| StorageError::LockPoisoned(e.to_string()).into())
    }
}

impl JobStore for SqliteJobStore {
    fn create(
        &self,
        job: NewTrainingJob,
        log_reference: LogReferenceFn<'_>,
    ) -> JobResult<TrainingJob> {
        let mut db = self.lock()?;
        let record = db.transaction(|tx| -> JobResult<TrainingJob> {
            tx.execute(
                "INSERT INTO training_jobs (dataset_id, owner_id, status, progress, epochs, \
                 learning_rate, batch_size, description, started_at, created_at) \
                 VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    job.dataset_id.0,
                    job.owner_id.0,
                    JobStatus::Pending.as_str(),
                    job.hyperparameters.epochs,
                    job.hyperparameters.learning_rate,
                    job.hyperparameters.batch_size,
                    job.description,
                    job.created_at.to_rfc3339(),
                    job.created_at.to_rfc3339(),
                ],
            )
            .map_err(StorageError::from)?;
            let id = JobId(tx.last_insert_rowid());
            tx.execute(
                "UPDATE training_jobs SET log_reference = ?1 WHERE id = ?2",
                params![log_reference(id), id.0],
            )
            .map_err(StorageError::from)?;
            load(tx, id)
        })?;
        info!(job_id = %record.id, dataset_id = %record.dataset_id, "Created training job");
        Ok(record)
    }

    fn get(&self, id: JobId) -> JobResult<TrainingJob> {
        let db = self.lock()?;
        db.conn()
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id.0], job_from_row)
            .optional()
            .map_err(StorageError::from)?
            .ok_or(JobError::JobNotFound(id))
    }

    fn update(&self, id: JobId, mutator: JobMutator<'_>) -> JobResult<TrainingJob> {
        let mut db = self.lock()?;
        db.transaction(|tx| {
            let original = load(tx, id)?;
            let mut edited = original.clone();
            mutator(&mut edited)?;

            let updated = TrainingJob {
                status: edited.status,
                progress: edited.progress,
                model_artifact_name: edited.model_artifact_name,
                started_at: edited.started_at,
                completed_at: edited.completed_at,
                ..original
            };
            updated.check_invariants()?;

            tx.execute(
                "UPDATE training_jobs SET status = ?1, progress = ?2, model_artifact_name = ?3, \
                 started_at = ?4, completed_at = ?5 WHERE id = ?6",
                params![
                    updated.status.as_str(),
                    updated.progress,
                    updated.model_artifact_name,
                    updated.started_at.map(|t| t.to_rfc3339()),
                    updated.completed_at.map(|t| t.to_rfc3339()),
                    id.0,
                ],
            )
            .map_err(StorageError::from)?;
            debug!(job_id = %id, status = %updated.status, progress = updated.progress, "Updated training job");
            Ok(updated)
        })
    }

    fn list(&self, filter: &JobFilter, page: Pagination) -> JobResult<Vec<TrainingJob>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(status) = filter.status {
            values.push(Value::Text(status.as_str().to_string()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(owner) = filter.owner {
            values.push(Value::Integer(owner.0));
            clauses.push(format!("owner_id = ?{}", values.len()));
        }

        let mut sql = SELECT_COLUMNS.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        // SQLite treats a negative LIMIT as unbounded.
        values.push(Value::Integer(i64::try_from(page.limit).unwrap_or(-1)));
        sql.push_str(&format!(" ORDER BY id DESC LIMIT ?{}", values.len()));
        values.push(Value::Integer(i64::try_from(page.offset).unwrap_or(i64::MAX)));
        sql.push_str(&format!(" OFFSET ?{}", values.len()));

        let db = self.lock()?;
        let mut stmt = db.conn().prepare(&sql).map_err(StorageError::from)?;
        let jobs = stmt
            .query_map(params_from_iter(values), job_from_row)
            .map_err(StorageError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(jobs)
    }
}
