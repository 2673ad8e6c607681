//! Model cache sizing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How many loaded models the cache may hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    8
}

#[derive(Debug, Error)]
pub enum CacheConfigError {
    #[error("model cache capacity must be at least 1")]
    ZeroCapacity,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: default_capacity() }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.capacity == 0 {
            return Err(CacheConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            CacheConfig::with_capacity(0).validate(),
            Err(CacheConfigError::ZeroCapacity)
        ));
    }
}
