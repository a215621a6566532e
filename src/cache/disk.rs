//! File-backed cache store
//!
//! Stores each entry as a JSON file with its expiry timestamp, so cached
//! forecasts survive between runs of the CLI.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{CacheEntry, CacheStore, CacheStoreError};

/// On-disk layout of a cache file
#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    /// The cached response body
    data: Value,
    /// When the data was cached
    cached_at: DateTime<Utc>,
    /// When the cache entry expires
    expires_at: DateTime<Utc>,
}

/// Reads and writes cache entries as JSON files in a directory
///
/// Defaults to an XDG-compliant cache directory (`~/.cache/skycache/` on
/// Linux). Expired files are left in place and remain readable through
/// [`CacheStore::get_stale`].
#[derive(Debug, Clone)]
pub struct DiskStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl DiskStore {
    /// Creates a DiskStore in the platform cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "skycache")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a DiskStore rooted at a custom directory
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to a cache file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Loads a cache file, treating missing or unreadable JSON as absent
    fn load(&self, key: &str) -> Result<Option<DiskEntry>, CacheStoreError> {
        let path = self.cache_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring unreadable cache file"
                );
                Ok(None)
            }
        }
    }
}

impl CacheStore for DiskStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        let now = Utc::now();
        Ok(self
            .load(key)?
            .filter(|entry| now <= entry.expires_at)
            .map(|entry| CacheEntry::with_timestamp(entry.data, entry.cached_at)))
    }

    fn get_stale(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        Ok(self
            .load(key)?
            .map(|entry| CacheEntry::with_timestamp(entry.data, entry.cached_at)))
    }

    fn put(
        &self,
        key: &str,
        entry: &CacheEntry,
        ttl: std::time::Duration,
    ) -> Result<(), CacheStoreError> {
        fs::create_dir_all(&self.cache_dir)?;

        let disk_entry = DiskEntry {
            data: entry.data.clone(),
            cached_at: entry.cached_at,
            expires_at: entry.expires_at(ttl),
        };

        let json = serde_json::to_string_pretty(&disk_entry)?;
        fs::write(self.cache_path(key), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const TTL: std::time::Duration = std::time::Duration::from_secs(300);

    fn create_test_store() -> (DiskStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = DiskStore::with_dir(temp_dir.path());
        (store, temp_dir)
    }

    #[test]
    fn test_put_creates_file_in_cache_directory() {
        let (store, temp_dir) = create_test_store();
        let entry = CacheEntry::new(json!({"current": {"temperature_2m": 19.5}}));

        store.put("test_key", &entry, TTL).expect("Put should succeed");

        let expected_path = temp_dir.path().join("test_key.json");
        assert!(expected_path.exists(), "Cache file should exist");

        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("\"temperature_2m\""));
        assert!(content.contains("\"cached_at\""));
        assert!(content.contains("\"expires_at\""));
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();

        assert!(store.get("nonexistent_key").unwrap().is_none());
        assert!(store.get_stale("nonexistent_key").unwrap().is_none());
    }

    #[test]
    fn test_get_returns_fresh_entry() {
        let (store, _temp_dir) = create_test_store();
        let entry = CacheEntry::new(json!({"hourly": {"temperature_2m": [1.0, 2.0]}}));

        store.put("fresh_key", &entry, TTL).expect("Put should succeed");

        let result = store.get("fresh_key").unwrap().expect("Should read fresh entry");
        assert_eq!(result, entry);
    }

    #[test]
    fn test_expired_entry_is_only_returned_by_stale_read() {
        let (store, _temp_dir) = create_test_store();
        let entry = CacheEntry::with_timestamp(
            json!({"current": {"temperature_2m": 12.0}}),
            Utc::now() - chrono::Duration::seconds(400),
        );

        store.put("expired_key", &entry, TTL).expect("Put should succeed");

        assert!(store.get("expired_key").unwrap().is_none());
        let stale = store.get_stale("expired_key").unwrap().expect("Stale read should succeed");
        assert_eq!(stale.data, entry.data);
        assert_eq!(stale.cached_at, entry.cached_at);
    }

    #[test]
    fn test_put_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache").join("dir");
        let store = DiskStore::with_dir(nested_path.clone());

        store
            .put("nested_key", &CacheEntry::new(json!({})), TTL)
            .expect("Put should succeed");

        assert!(nested_path.join("nested_key.json").exists(), "Cache file should exist");
    }

    #[test]
    fn test_unreadable_file_is_treated_as_missing() {
        let (store, temp_dir) = create_test_store();
        fs::write(temp_dir.path().join("broken.json"), "{ not json").unwrap();

        assert!(store.get("broken").unwrap().is_none());
        assert!(store.get_stale("broken").unwrap().is_none());
    }

    #[test]
    fn test_overwrite_existing_entry() {
        let (store, _temp_dir) = create_test_store();
        let first = CacheEntry::new(json!({"v": 1}));
        let second = CacheEntry::new(json!({"v": 2}));

        store.put("overwrite_key", &first, TTL).expect("First put should succeed");
        store.put("overwrite_key", &second, TTL).expect("Second put should succeed");

        let result = store.get("overwrite_key").unwrap().expect("Should read entry");
        assert_eq!(result.data, json!({"v": 2}));
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = DiskStore::new() {
            let path_str = store.cache_dir().to_string_lossy();
            assert!(path_str.contains("skycache"), "Cache path should contain project name");
        }
        // Passes if new() returns None (e.g., no home directory in CI)
    }
}
