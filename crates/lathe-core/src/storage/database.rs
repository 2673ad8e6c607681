//! Database connection and schema management.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use tracing::info;

use crate::storage::error::{StorageError, StorageResult};

/// Database connection wrapper.
///
/// Manages the SQLite connection and schema initialization.
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.conn.path()).finish()
    }
}

impl Database {
    /// Opens a database file, creating it and its schema if needed.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the database connection fails
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // Runners and the CLI may hold the file concurrently.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an in-memory database for testing.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Gets a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Creates the tables and indexes. Safe to run on an existing database.
    fn init_schema(&self) -> StorageResult<()> {
        info!("Initializing database schema");

        self.conn.execute(
            r"
            CREATE TABLE IF NOT EXISTS training_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dataset_id INTEGER NOT NULL,
                owner_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                epochs INTEGER NOT NULL,
                learning_rate REAL NOT NULL,
                batch_size INTEGER NOT NULL,
                description TEXT,
                model_artifact_name TEXT,
                log_reference TEXT NOT NULL DEFAULT '',
                started_at TEXT,
                completed_at TEXT,
                created_at TEXT NOT NULL
            )
            ",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_training_jobs_status ON training_jobs(status)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_training_jobs_owner_id ON training_jobs(owner_id)",
            [],
        )?;

        Ok(())
    }

    /// Runs the closure inside an immediate (write-locking) transaction.
    ///
    /// The transaction commits when the closure returns `Ok` and rolls back
    /// otherwise; the closure's error is returned unchanged.
    pub fn transaction<F, R, E>(&mut self, f: F) -> Result<R, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, E>,
        E: From<StorageError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        match f(&tx) {
            Ok(result) => {
                tx.commit().map_err(StorageError::from)?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback().map_err(StorageError::from)?;
                Err(e)
            }
        }
    }
}
