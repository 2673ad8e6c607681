//! Loaded models and how they are produced from artifacts.

use std::sync::Arc;

use lathe_training::{JobResult, ModelLayout, TrainingManifest};
use serde::Serialize;
use tracing::debug;

use crate::cache::ModelLoader;

/// Pretrained model used when no trained model is requested or available.
pub const DEFAULT_MODEL_NAME: &str = "cardiffnlp/twitter-roberta-base-sentiment-latest";

/// Output of one inference call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub predicted_class: String,
    /// In `[0, 1]`.
    pub confidence: f64,
}

/// A model held in memory and ready for inference.
pub trait InferenceModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, text: &str) -> Prediction;
}

/// Stand-in classifier that buckets text by length.
#[derive(Debug, Clone)]
pub struct LengthClassifier {
    name: String,
    manifest: Option<TrainingManifest>,
}

impl LengthClassifier {
    #[must_use]
    pub fn pretrained(name: impl Into<String>) -> Self {
        Self { name: name.into(), manifest: None }
    }

    #[must_use]
    pub fn trained(manifest: TrainingManifest) -> Self {
        Self { name: manifest.model_artifact_name.clone(), manifest: Some(manifest) }
    }

    #[must_use]
    pub fn manifest(&self) -> Option<&TrainingManifest> {
        self.manifest.as_ref()
    }
}

impl InferenceModel for LengthClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, text: &str) -> Prediction {
        let (class, confidence) = match text.chars().count() {
            0..10 => ("short", 0.85),
            10..50 => ("medium", 0.75),
            _ => ("long", 0.92),
        };
        Prediction { predicted_class: class.to_string(), confidence }
    }
}

/// Loads trained models from their manifests under the model directory.
#[derive(Debug, Clone)]
pub struct ManifestModelLoader {
    layout: ModelLayout,
    default_model: String,
}

impl ManifestModelLoader {
    #[must_use]
    pub fn new(layout: ModelLayout) -> Self {
        Self { layout, default_model: DEFAULT_MODEL_NAME.to_string() }
    }

    #[must_use]
    pub fn with_default_model(mut self, name: impl Into<String>) -> Self {
        self.default_model = name.into();
        self
    }
}

impl ModelLoader for ManifestModelLoader {
    fn load(&self, name: &str) -> JobResult<Arc<dyn InferenceModel>> {
        if name == self.default_model {
            return Ok(Arc::new(LengthClassifier::pretrained(name)));
        }
        let manifest = TrainingManifest::read(&self.layout, name)?;
        debug!(model = %name, job_id = %manifest.job_id, "Loaded trained model manifest");
        Ok(Arc::new(LengthClassifier::trained(manifest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lathe_training::JobError;

    #[test]
    fn test_length_buckets() {
        let model = LengthClassifier::pretrained(DEFAULT_MODEL_NAME);
        assert_eq!(model.predict("hi").predicted_class, "short");
        assert_eq!(model.predict("a medium sized sentence").predicted_class, "medium");
        let long = "x".repeat(50);
        let prediction = model.predict(&long);
        assert_eq!(prediction.predicted_class, "long");
        assert!((prediction.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn test_loader_missing_manifest() {
        let temp = tempfile::TempDir::new().unwrap();
        let loader = ManifestModelLoader::new(ModelLayout::new(temp.path()));
        assert!(loader.load(DEFAULT_MODEL_NAME).is_ok());
        assert!(matches!(loader.load("model_1_1_0"), Err(JobError::ModelNotFound(_))));
    }
}
