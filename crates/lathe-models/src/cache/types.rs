//! Cache entries and counters.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::model::InferenceModel;

/// A loaded model plus its recency bookkeeping.
#[derive(Clone)]
pub struct CachedModel {
    pub model: Arc<dyn InferenceModel>,
    /// Value of the cache clock at the last use; the smallest is evicted first.
    pub access_seq: u64,
    pub uses: u64,
}

impl CachedModel {
    pub fn new(model: Arc<dyn InferenceModel>, access_seq: u64) -> Self {
        Self { model, access_seq, uses: 1 }
    }

    pub fn touch(&mut self, access_seq: u64) {
        self.access_seq = access_seq;
        self.uses += 1;
    }
}

impl fmt::Debug for CachedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedModel")
            .field("model", &self.model.name())
            .field("access_seq", &self.access_seq)
            .field("uses", &self.uses)
            .finish()
    }
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Models currently held.
    pub loaded: usize,
    pub capacity: usize,
}
