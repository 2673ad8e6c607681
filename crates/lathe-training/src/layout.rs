use crate::error::{JobError, JobResult};
use std::path::{Path, PathBuf};

/// Filesystem layout for trained model artifacts.
///
/// Each completed job owns `<root>/<model_artifact_name>/`.
#[derive(Debug, Clone)]
pub struct ModelLayout {
    root: PathBuf,
}

impl ModelLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn model_dir(&self, model_name: &str) -> PathBuf {
        self.root.join(model_name)
    }

    #[must_use]
    pub fn manifest_path(&self, model_name: &str) -> PathBuf {
        self.model_dir(model_name).join("training_manifest.json")
    }

    pub fn ensure_model_dir(&self, model_name: &str) -> JobResult<PathBuf> {
        let dir = self.model_dir(model_name);
        std::fs::create_dir_all(&dir).map_err(|e| {
            JobError::Storage(format!("failed to create model dir {}: {e}", dir.display()))
        })?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = ModelLayout::new(temp.path().join("models"));

        let dir = layout.ensure_model_dir("model_1_2_3").unwrap();
        assert!(dir.is_dir());
        assert!(layout.manifest_path("model_1_2_3").ends_with("model_1_2_3/training_manifest.json"));
    }
}
