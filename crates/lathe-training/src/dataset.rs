use crate::error::{JobError, JobResult};
use crate::principal::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Identifier of an uploaded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub i64);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the orchestrator needs to know about a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,
    pub owner_id: UserId,
    pub file_reference: String,
}

/// Dataset lookup provided by the dataset service.
///
/// Upload and content validation live outside the orchestrator; only
/// existence and ownership are consulted here.
pub trait DatasetCatalog: Send + Sync {
    /// Returns the dataset or `JobError::DatasetNotFound`.
    fn get_dataset(&self, id: DatasetId) -> JobResult<DatasetRecord>;
}

/// Catalog backed by a map, used by the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryDatasetCatalog {
    datasets: RwLock<HashMap<DatasetId, DatasetRecord>>,
}

impl InMemoryDatasetCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_datasets(records: impl IntoIterator<Item = DatasetRecord>) -> Self {
        let catalog = Self::new();
        for record in records {
            catalog.insert(record);
        }
        catalog
    }

    pub fn insert(&self, record: DatasetRecord) {
        if let Ok(mut datasets) = self.datasets.write() {
            datasets.insert(record.id, record);
        }
    }

    #[must_use]
    pub fn list(&self) -> Vec<DatasetRecord> {
        let mut records: Vec<_> = self
            .datasets
            .read()
            .map(|datasets| datasets.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.id);
        records
    }
}

impl DatasetCatalog for InMemoryDatasetCatalog {
    fn get_dataset(&self, id: DatasetId) -> JobResult<DatasetRecord> {
        let datasets = self
            .datasets
            .read()
            .map_err(|e| JobError::Storage(format!("dataset catalog lock poisoned: {e}")))?;
        datasets.get(&id).cloned().ok_or(JobError::DatasetNotFound(id))
    }
}
