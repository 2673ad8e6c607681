//! Integration tests for model resolution and prediction.

use std::sync::Arc;

use chrono::Utc;
use lathe_core::{JobStore, SqliteJobStore, log_reference};
use lathe_models::{
    CacheConfig, DEFAULT_MODEL_NAME, ManifestModelLoader, ModelCache, PredictionRequest,
    PredictionService,
};
use lathe_training::{
    DatasetId, EpochMetrics, HyperParameters, JobError, JobId, JobStatus, ModelLayout,
    NewTrainingJob, Principal, TrainingJob, TrainingManifest, UserId, model_artifact_name,
};
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    layout: ModelLayout,
    store: Arc<SqliteJobStore>,
    service: PredictionService,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let layout = ModelLayout::new(temp.path().join("models"));
    let store = Arc::new(SqliteJobStore::open_in_memory().unwrap());
    let cache = ModelCache::new(CacheConfig::with_capacity(2)).unwrap();
    let service = PredictionService::new(
        store.clone(),
        cache,
        Arc::new(ManifestModelLoader::new(layout.clone())),
    );
    Fixture { _temp: temp, layout, store, service }
}

fn completed_job(fx: &Fixture, owner: i64, write_manifest: bool) -> TrainingJob {
    let job = fx
        .store
        .create(
            NewTrainingJob {
                dataset_id: DatasetId(1),
                owner_id: UserId(owner),
                hyperparameters: HyperParameters::default(),
                description: None,
                created_at: Utc::now(),
            },
            &log_reference,
        )
        .unwrap();
    let name = model_artifact_name(job.dataset_id, job.id, Utc::now());
    if write_manifest {
        TrainingManifest {
            job_id: job.id,
            dataset_id: job.dataset_id,
            model_artifact_name: name.clone(),
            trainer: "simulated".to_string(),
            hyperparameters: job.hyperparameters,
            metrics: vec![EpochMetrics { epoch: 1, loss: 0.5 }],
            created_at: Utc::now(),
        }
        .write(&fx.layout)
        .unwrap();
    }
    fx.store
        .update(job.id, &mut |j| {
            j.status = JobStatus::Completed;
            j.progress = 100.0;
            j.model_artifact_name = Some(name.clone());
            j.completed_at = Some(Utc::now());
            Ok(())
        })
        .unwrap()
}

#[test]
fn test_default_model_when_none_requested() {
    let fx = fixture();
    let result =
        fx.service.predict(&PredictionRequest::new("great movie"), &Principal::user(1)).unwrap();
    assert_eq!(result.model_name, DEFAULT_MODEL_NAME);
    assert_eq!(result.predicted_class, "medium");
    assert!(result.model_job_id.is_none());
}

#[test]
fn test_trained_model_is_used() {
    let fx = fixture();
    let job = completed_job(&fx, 1, true);

    let request = PredictionRequest::new("ok").with_model(job.id);
    let result = fx.service.predict(&request, &Principal::user(1)).unwrap();
    assert_eq!(Some(result.model_name.as_str()), job.model_artifact_name.as_deref());
    assert_eq!(result.model_job_id, Some(job.id));
    assert_eq!(result.predicted_class, "short");

    fx.service.predict(&request, &Principal::user(1)).unwrap();
    assert_eq!(fx.service.cache_stats().hits, 1);
}

#[test]
fn test_falls_back_to_default_model() {
    let fx = fixture();
    let other_users_job = completed_job(&fx, 2, true);
    let without_manifest = completed_job(&fx, 1, false);

    for job_id in [JobId(999), other_users_job.id, without_manifest.id] {
        let request = PredictionRequest::new("some text").with_model(job_id);
        let result = fx.service.predict(&request, &Principal::user(1)).unwrap();
        assert_eq!(result.model_name, DEFAULT_MODEL_NAME, "job {job_id}");
        assert!(result.model_job_id.is_none());
    }
}

#[test]
fn test_rejects_empty_and_oversized_text() {
    let fx = fixture();
    assert!(matches!(
        fx.service.predict(&PredictionRequest::new("   "), &Principal::user(1)),
        Err(JobError::Validation(_))
    ));
    let huge = "a".repeat(10_001);
    assert!(matches!(
        fx.service.predict(&PredictionRequest::new(huge), &Principal::user(1)),
        Err(JobError::Validation(_))
    ));
}
