//! Inference over trained or pretrained models.

use std::sync::Arc;

use lathe_core::JobStore;
use lathe_training::{JobError, JobId, JobResult, JobStatus, Principal};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{CacheStats, ModelCache, ModelLoader};
use crate::model::DEFAULT_MODEL_NAME;

/// Longest text accepted for prediction, in characters.
pub const MAX_TEXT_CHARS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub text: String,
    /// Job whose trained model should be used; `None` selects the default model.
    #[serde(default)]
    pub model_job_id: Option<JobId>,
}

impl PredictionRequest {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), model_job_id: None }
    }

    #[must_use]
    pub fn with_model(mut self, job_id: JobId) -> Self {
        self.model_job_id = Some(job_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub text: String,
    pub predicted_class: String,
    pub confidence: f64,
    pub model_name: String,
    /// The job whose model answered, or `None` when the default model did.
    pub model_job_id: Option<JobId>,
}

/// Resolves the requested model and runs inference through the cache.
///
/// A requested job that is missing, not visible to the caller, not yet
/// Completed, or whose artifact cannot be loaded falls back to the default
/// model.
pub struct PredictionService {
    store: Arc<dyn JobStore>,
    cache: ModelCache,
    loader: Arc<dyn ModelLoader>,
    default_model: String,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("cache", &self.cache)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

impl PredictionService {
    pub fn new(store: Arc<dyn JobStore>, cache: ModelCache, loader: Arc<dyn ModelLoader>) -> Self {
        Self { store, cache, loader, default_model: DEFAULT_MODEL_NAME.to_string() }
    }

    #[must_use]
    pub fn with_default_model(mut self, name: impl Into<String>) -> Self {
        self.default_model = name.into();
        self
    }

    pub fn predict(
        &self,
        request: &PredictionRequest,
        principal: &Principal,
    ) -> JobResult<PredictionResult> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(JobError::Validation("text must not be empty".to_string()));
        }
        if request.text.chars().count() > MAX_TEXT_CHARS {
            return Err(JobError::Validation(format!(
                "text must be at most {MAX_TEXT_CHARS} characters"
            )));
        }

        let (name, job_id) = self.resolve_model(request.model_job_id, principal)?;
        let (model, job_id) = match self.cache.get_or_load(&name, self.loader.as_ref()) {
            Ok(model) => (model, job_id),
            Err(JobError::ModelNotFound(missing)) if job_id.is_some() => {
                warn!(model = %missing, "Trained model artifact missing, using default model");
                (self.cache.get_or_load(&self.default_model, self.loader.as_ref())?, None)
            }
            Err(e) => return Err(e),
        };

        let prediction = model.predict(&request.text);
        info!(
            model = %model.name(),
            class = %prediction.predicted_class,
            confidence = prediction.confidence,
            "Prediction completed"
        );
        Ok(PredictionResult {
            text: request.text.clone(),
            predicted_class: prediction.predicted_class,
            confidence: prediction.confidence,
            model_name: model.name().to_string(),
            model_job_id: job_id,
        })
    }

    fn resolve_model(
        &self,
        job_id: Option<JobId>,
        principal: &Principal,
    ) -> JobResult<(String, Option<JobId>)> {
        let Some(job_id) = job_id else {
            return Ok((self.default_model.clone(), None));
        };
        match self.store.get(job_id) {
            Ok(job) if principal.can_access(job.owner_id) && job.status == JobStatus::Completed => {
                match job.model_artifact_name {
                    Some(name) => Ok((name, Some(job_id))),
                    None => Ok((self.default_model.clone(), None)),
                }
            }
            Ok(_) | Err(JobError::JobNotFound(_)) => {
                warn!(job_id = %job_id, "No completed model for job, using default model");
                Ok((self.default_model.clone(), None))
            }
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.get_stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
