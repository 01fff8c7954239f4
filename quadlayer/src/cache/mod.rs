//! In-memory caching.
//!
//! [`LruCache`] is a generic, byte-bounded store with least-recently-used
//! eviction. The index resolver keeps one per layer client for quad-tree
//! index fragments.

mod lru;

pub use lru::{CacheStats, EvictionListener, Keys, LruCache, Weigher, DEFAULT_CAPACITY_MB};

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A new value is larger than the whole cache.
    #[error("Value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },
}
