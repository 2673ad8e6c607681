//! Bounded cache of loaded models.
//!
//! Models are loaded lazily on first use and kept in memory up to a fixed
//! capacity; inserting into a full cache evicts the least recently used model.

pub mod cache;
pub mod config;
pub mod types;

pub use cache::{ModelCache, ModelLoader};
pub use config::{CacheConfig, CacheConfigError};
pub use types::{CacheStats, CachedModel};
