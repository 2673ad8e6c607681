use crate::dataset::DatasetId;
use crate::error::{JobError, JobResult};
use crate::job::{HyperParameters, JobId};
use crate::layout::ModelLayout;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Name given to the model produced by a completed job.
#[must_use]
pub fn model_artifact_name(dataset_id: DatasetId, job_id: JobId, at: DateTime<Utc>) -> String {
    format!("model_{}_{}_{}", dataset_id, job_id, at.timestamp())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: u32,
    pub loss: f64,
}

/// Summary written next to a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingManifest {
    pub job_id: JobId,
    pub dataset_id: DatasetId,
    pub model_artifact_name: String,
    pub trainer: String,
    pub hyperparameters: HyperParameters,
    #[serde(default)]
    pub metrics: Vec<EpochMetrics>,
    pub created_at: DateTime<Utc>,
}

impl TrainingManifest {
    #[must_use]
    pub fn final_loss(&self) -> Option<f64> {
        self.metrics.last().map(|m| m.loss)
    }

    pub fn write(&self, layout: &ModelLayout) -> JobResult<PathBuf> {
        layout.ensure_model_dir(&self.model_artifact_name)?;
        let path = layout.manifest_path(&self.model_artifact_name);
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| JobError::Storage(format!("failed to encode manifest: {e}")))?;
        std::fs::write(&path, bytes).map_err(|e| {
            JobError::Storage(format!("failed to write manifest {}: {e}", path.display()))
        })?;
        debug!(job_id = %self.job_id, path = %path.display(), "Wrote training manifest");
        Ok(path)
    }

    pub fn read(layout: &ModelLayout, model_name: &str) -> JobResult<Self> {
        let path = layout.manifest_path(model_name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(JobError::ModelNotFound(model_name.to_string()));
            }
            Err(e) => {
                return Err(JobError::Storage(format!(
                    "failed to read manifest {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| JobError::Storage(format!("corrupt manifest {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_write_and_read() {
        let temp = TempDir::new().unwrap();
        let layout = ModelLayout::new(temp.path());
        let created_at = Utc::now();
        let name = model_artifact_name(DatasetId(4), JobId(9), created_at);
        assert!(name.starts_with("model_4_9_"));

        let manifest = TrainingManifest {
            job_id: JobId(9),
            dataset_id: DatasetId(4),
            model_artifact_name: name.clone(),
            trainer: "simulated".to_string(),
            hyperparameters: HyperParameters::default(),
            metrics: vec![EpochMetrics { epoch: 1, loss: 0.9 }, EpochMetrics { epoch: 2, loss: 0.4 }],
            created_at,
        };
        manifest.write(&layout).unwrap();

        let loaded = TrainingManifest::read(&layout, &name).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.final_loss(), Some(0.4));
    }

    #[test]
    fn test_missing_manifest_is_model_not_found() {
        let temp = TempDir::new().unwrap();
        let layout = ModelLayout::new(temp.path());
        assert!(matches!(
            TrainingManifest::read(&layout, "model_0_0_0"),
            Err(JobError::ModelNotFound(_))
        ));
    }
}
