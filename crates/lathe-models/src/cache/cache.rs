//! ModelCache implementation with lazy loading and LRU eviction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use lathe_training::{JobError, JobResult};
use tracing::{debug, info};

use super::config::{CacheConfig, CacheConfigError};
use super::types::{CacheStats, CachedModel};
use crate::model::InferenceModel;

/// Produces a model instance from its name on a cache miss.
pub trait ModelLoader: Send + Sync {
    /// # Errors
    /// Returns `JobError::ModelNotFound` if no artifact exists for `name`.
    fn load(&self, name: &str) -> JobResult<Arc<dyn InferenceModel>>;
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CachedModel>,
    stats: CacheStats,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn find_lru_key(&self) -> Option<String> {
        self.entries.iter().min_by_key(|(_, cached)| cached.access_seq).map(|(key, _)| key.clone())
    }
}

/// Bounded model cache keyed by model name.
///
/// Holds at most `capacity` models.
pub struct ModelCache {
    state: Mutex<CacheState>,
    config: CacheConfig,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache").field("config", &self.config).finish_non_exhaustive()
    }
}

impl ModelCache {
    /// Create a new model cache with the given configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn new(config: CacheConfig) -> Result<Self, CacheConfigError> {
        config.validate()?;
        let state = CacheState {
            stats: CacheStats { capacity: config.capacity, ..CacheStats::default() },
            ..CacheState::default()
        };
        Ok(Self { state: Mutex::new(state), config })
    }

    fn lock(&self) -> JobResult<MutexGuard<'_, CacheState>> {
        self.state.lock().map_err(|e| JobError::Storage(format!("model cache lock poisoned: {e}")))
    }

    /// Get a model from cache or load it if not present.
    ///
    /// The loader runs without the cache lock held. If the cache is full the
    /// least recently used model is evicted before inserting.
    pub fn get_or_load(
        &self,
        name: &str,
        loader: &dyn ModelLoader,
    ) -> JobResult<Arc<dyn InferenceModel>> {
        {
            let mut state = self.lock()?;
            let seq = state.tick();
            if let Some(cached) = state.entries.get_mut(name) {
                cached.touch(seq);
                let model = Arc::clone(&cached.model);
                state.stats.hits += 1;
                debug!(model = %name, "Cache hit");
                return Ok(model);
            }
            state.stats.misses += 1;
        }

        debug!(model = %name, "Cache miss, loading model");
        let model = loader.load(name)?;

        let mut state = self.lock()?;
        let seq = state.tick();
        // Another caller may have loaded the same model meanwhile.
        if let Some(cached) = state.entries.get_mut(name) {
            cached.touch(seq);
            return Ok(Arc::clone(&cached.model));
        }

        if state.entries.len() >= self.config.capacity {
            if let Some(lru_key) = state.find_lru_key() {
                state.entries.remove(&lru_key);
                state.stats.evictions += 1;
                info!(model = %lru_key, "Evicted LRU model from cache");
            }
        }

        state.entries.insert(name.to_string(), CachedModel::new(Arc::clone(&model), seq));
        state.stats.loaded = state.entries.len();
        info!(model = %name, "Model cached");
        Ok(model)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lock().map(|state| state.entries.contains_key(name)).unwrap_or(false)
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn get_stats(&self) -> CacheStats {
        self.lock()
            .map(|state| CacheStats { loaded: state.entries.len(), ..state.stats.clone() })
            .unwrap_or_default()
    }

    /// Clear all models from the cache.
    pub fn clear(&self) {
        if let Ok(mut state) = self.lock() {
            let cleared_count = state.entries.len();
            state.entries.clear();
            state.stats.loaded = 0;
            info!(cleared_count, "Cleared all models from cache");
        }
    }

    /// Remove a specific model from the cache.
    pub fn remove(&self, name: &str) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        let removed = state.entries.remove(name).is_some();
        state.stats.loaded = state.entries.len();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LengthClassifier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, name: &str) -> JobResult<Arc<dyn InferenceModel>> {
            if name == "missing" {
                return Err(JobError::ModelNotFound(name.to_string()));
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(LengthClassifier::pretrained(name)))
        }
    }

    #[test]
    fn test_cache_hit_and_miss() {
        let cache = ModelCache::new(CacheConfig::with_capacity(2)).unwrap();
        let loader = CountingLoader::default();

        let first = cache.get_or_load("a", &loader).unwrap();
        let second = cache.get_or_load("a", &loader).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.loaded, 1);
        assert_eq!(stats.capacity, 2);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ModelCache::new(CacheConfig::with_capacity(2)).unwrap();
        let loader = CountingLoader::default();

        cache.get_or_load("a", &loader).unwrap();
        cache.get_or_load("b", &loader).unwrap();
        // "a" becomes most recently used, so "b" is evicted next.
        cache.get_or_load("a", &loader).unwrap();
        cache.get_or_load("c", &loader).unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        let stats = cache.get_stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.loaded, 2);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let cache = ModelCache::new(CacheConfig::with_capacity(3)).unwrap();
        let loader = CountingLoader::default();
        for i in 0..20 {
            cache.get_or_load(&format!("model-{i}"), &loader).unwrap();
            assert!(cache.get_stats().loaded <= 3);
        }
        assert_eq!(cache.get_stats().evictions, 17);
    }

    #[test]
    fn test_load_failure_is_not_cached() {
        let cache = ModelCache::new(CacheConfig::default()).unwrap();
        let loader = CountingLoader::default();
        assert!(matches!(cache.get_or_load("missing", &loader), Err(JobError::ModelNotFound(_))));
        assert!(!cache.contains("missing"));
        assert_eq!(cache.get_stats().loaded, 0);
    }

    #[test]
    fn test_clear_and_remove() {
        let cache = ModelCache::new(CacheConfig::default()).unwrap();
        let loader = CountingLoader::default();
        cache.get_or_load("a", &loader).unwrap();
        cache.get_or_load("b", &loader).unwrap();

        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        cache.clear();
        assert_eq!(cache.get_stats().loaded, 0);
    }

    #[test]
    fn test_invalid_config() {
        assert!(ModelCache::new(CacheConfig::with_capacity(0)).is_err());
    }
}
