//! Cache stores for upstream forecast responses
//!
//! A store keeps each [`CacheEntry`] past its native expiry so that the
//! coordinator can fall back to stale data when the upstream API throttles.
//! Two stores are provided: [`MemoryStore`] for in-process use and
//! [`DiskStore`], which persists entries as JSON files.

mod disk;
mod entry;
mod memory;

pub use disk::DiskStore;
pub use entry::{CacheEntry, Freshness};
pub use memory::MemoryStore;

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a cache store operation
#[derive(Debug, Error)]
pub enum CacheStoreError {
    /// Reading or writing the backing storage failed
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be serialized for storage
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store's internal lock was poisoned by a panicking writer
    #[error("cache store lock poisoned")]
    Poisoned,
}

/// Keyed storage for cache entries
///
/// Implementations must keep expired entries retrievable through
/// [`CacheStore::get_stale`] until they are overwritten or evicted.
pub trait CacheStore: Send + Sync {
    /// Returns the entry for `key` if present and not past its native expiry
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError>;

    /// Returns the entry for `key` if physically present, ignoring expiry
    fn get_stale(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError>;

    /// Stores `entry` under `key`, expiring `ttl` after its `cached_at`
    fn put(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheStoreError>;
}
