//! In-process cache store

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{CacheEntry, CacheStore, CacheStoreError};

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: CacheEntry,
    expires_at: DateTime<Utc>,
}

/// Thread-safe in-memory store
///
/// Entries past their expiry are kept until overwritten, so stale reads keep
/// working for the lifetime of the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        let entries = self.entries.read().map_err(|_| CacheStoreError::Poisoned)?;
        let now = Utc::now();

        Ok(entries
            .get(key)
            .filter(|stored| now <= stored.expires_at)
            .map(|stored| stored.entry.clone()))
    }

    fn get_stale(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        let entries = self.entries.read().map_err(|_| CacheStoreError::Poisoned)?;
        Ok(entries.get(key).map(|stored| stored.entry.clone()))
    }

    fn put(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheStoreError> {
        let expires_at = entry.expires_at(ttl);
        let mut entries = self.entries.write().map_err(|_| CacheStoreError::Poisoned)?;

        entries.insert(
            key.to_string(),
            StoredEntry {
                entry: entry.clone(),
                expires_at,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let store = MemoryStore::new();
        assert!(store.get("missing").unwrap().is_none());
        assert!(store.get_stale("missing").unwrap().is_none());
    }

    #[test]
    fn test_put_then_get_fresh_entry() {
        let store = MemoryStore::new();
        let entry = CacheEntry::new(json!({"temperature_2m": 21.4}));

        store.put("key", &entry, TTL).unwrap();

        assert_eq!(store.get("key").unwrap(), Some(entry.clone()));
        assert_eq!(store.get_stale("key").unwrap(), Some(entry));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expired_entry_only_visible_to_stale_read() {
        let store = MemoryStore::new();
        let entry = CacheEntry::with_timestamp(
            json!({"temperature_2m": 18.0}),
            Utc::now() - chrono::Duration::seconds(400),
        );

        store.put("key", &entry, TTL).unwrap();

        assert!(store.get("key").unwrap().is_none());
        assert_eq!(store.get_stale("key").unwrap(), Some(entry));
    }

    #[test]
    fn test_put_overwrites_existing_entry() {
        let store = MemoryStore::new();
        let old = CacheEntry::with_timestamp(
            json!({"v": 1}),
            Utc::now() - chrono::Duration::seconds(400),
        );
        let new = CacheEntry::new(json!({"v": 2}));

        store.put("key", &old, TTL).unwrap();
        store.put("key", &new, TTL).unwrap();

        assert_eq!(store.get("key").unwrap(), Some(new));
        assert_eq!(store.len(), 1);
    }
}
