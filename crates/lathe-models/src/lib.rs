//! Lathe Models
//!
//! Inference over the models produced by training jobs:
//! - A bounded LRU cache of loaded models (`cache`)
//! - Model loading from training manifests (`model`)
//! - The prediction service with default-model fallback (`prediction`)

pub mod cache;
pub mod model;
pub mod prediction;

pub use cache::{CacheConfig, CacheConfigError, CacheStats, ModelCache, ModelLoader};
pub use model::{
    DEFAULT_MODEL_NAME, InferenceModel, LengthClassifier, ManifestModelLoader, Prediction,
};
pub use prediction::{MAX_TEXT_CHARS, PredictionRequest, PredictionResult, PredictionService};
