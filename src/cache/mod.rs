//! Worker-side response caches
//!
//! Two named caches make up one generation: the static cache (application
//! shell, bundles, icons, map assets) and the data cache (story listings).
//! Both live in SQLite with file blobs for large bodies.

pub mod key;
pub mod storage;
pub mod strategy;

/// Names of the caches that belong to one deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
    pub static_name: String,
    pub data_name: String,
}

impl CacheGeneration {
    pub fn new(version: u32) -> Self {
        Self {
            static_name: format!("storykeep-cache-v{}", version),
            data_name: format!("storykeep-data-v{}", version),
        }
    }

    /// Whether a cache name belongs to this generation
    pub fn owns(&self, name: &str) -> bool {
        name == self.static_name || name == self.data_name
    }
}

// Re-export main types
pub use key::cache_key;
pub use storage::CacheStorage;
pub use strategy::{Intercepted, ResponseSource, Scope, StrategyEngine};
