//! TTL cache with bounded size and optional JSON persistence
//!
//! Entries expire lazily: an expired entry is only removed when a lookup
//! touches it. Before a new key is written, the oldest entries (by
//! `stored_at`) are evicted until the new entry fits within `max_items`.
//! A persistent cache writes its whole map through to one JSON file after
//! every mutation, and that file is the only state read back on restart.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

/// A cached value and the moment it was stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached data
    pub data: T,
    /// When the data was cached
    pub stored_at: DateTime<Utc>,
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// A valid entry was found
    Hit(T),
    /// Nothing is stored under the key
    Miss,
    /// An entry existed but was expired or rejected, and has been removed
    Evicted(T),
}

/// In-memory cache keyed by string, with time-to-live and capacity bounds
#[derive(Debug)]
pub struct CacheManager<T> {
    entries: HashMap<String, CacheEntry<T>>,
    ttl: Duration,
    max_items: usize,
    /// File the cache is written through to, if persistent
    persist_path: Option<PathBuf>,
}

impl<T> CacheManager<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Creates an empty in-memory cache
    pub fn new(ttl: std::time::Duration, max_items: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: to_chrono(ttl),
            max_items,
            persist_path: None,
        }
    }

    /// Creates a cache backed by a JSON file, loading any entries already in it
    ///
    /// An unreadable or corrupt file is logged and replaced on the next write.
    pub fn persistent(path: PathBuf, ttl: std::time::Duration, max_items: usize) -> Self {
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring corrupt cache file '{}': {}", path.display(), e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            entries,
            ttl: to_chrono(ttl),
            max_items,
            persist_path: Some(path),
        }
    }

    /// Returns the value for `key` if it is still within its TTL
    pub fn get(&mut self, key: &str) -> Option<T> {
        match self.lookup_with(key, |_| true) {
            Lookup::Hit(data) => Some(data),
            Lookup::Miss | Lookup::Evicted(_) => None,
        }
    }

    /// Looks up `key`, treating the entry as valid only if it is within its
    /// TTL and `is_usable` accepts it. Invalid entries are removed.
    pub fn lookup_with<F>(&mut self, key: &str, is_usable: F) -> Lookup<T>
    where
        F: FnOnce(&T) -> bool,
    {
        let valid = match self.entries.get(key) {
            None => return Lookup::Miss,
            Some(entry) => !self.is_expired(entry, Utc::now()) && is_usable(&entry.data),
        };

        if valid {
            return match self.entries.get(key) {
                Some(entry) => Lookup::Hit(entry.data.clone()),
                None => Lookup::Miss,
            };
        }

        debug!("Evicting stale cache entry '{}'", key);
        match self.remove(key) {
            Some(data) => Lookup::Evicted(data),
            None => Lookup::Miss,
        }
    }

    /// Stores `data` under `key`, evicting the oldest entries first if the
    /// cache is full. Returns the evicted values so callers can release any
    /// resources they reference.
    pub fn insert(&mut self, key: &str, data: T) -> Vec<T> {
        if self.max_items == 0 {
            return Vec::new();
        }

        let mut evicted = Vec::new();
        if !self.entries.contains_key(key) {
            while self.entries.len() >= self.max_items {
                match self.oldest_key() {
                    Some(oldest) => {
                        debug!("Cache full, evicting oldest entry '{}'", oldest);
                        if let Some(entry) = self.entries.remove(&oldest) {
                            evicted.push(entry.data);
                        }
                    }
                    None => break,
                }
            }
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                stored_at: Utc::now(),
            },
        );
        self.persist();
        evicted
    }

    /// Removes `key`, returning its value if present
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let removed = self.entries.remove(key).map(|entry| entry.data);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn is_expired(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        entry.stored_at + self.ttl < now
    }

    fn oldest_key(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| key.clone())
    }

    /// Writes the whole cache to its backing file; failures are logged only
    fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!("Failed to create cache directory '{}': {}", parent.display(), e);
                    return;
                }
            }
        }

        let result = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .and_then(|json| fs::write(path, json));
        if let Err(e) = result {
            warn!("Failed to write cache file '{}': {}", path.display(), e);
        }
    }
}

/// Converts a TTL, clamping absurd values to a century so date math cannot overflow
fn to_chrono(ttl: std::time::Duration) -> Duration {
    let century = Duration::days(36_500);
    Duration::from_std(ttl).map_or(century, |ttl| ttl.min(century))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::thread;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    fn data(name: &str, value: i32) -> TestData {
        TestData {
            name: name.to_string(),
            value,
        }
    }

    fn hour_cache(max_items: usize) -> CacheManager<TestData> {
        CacheManager::new(StdDuration::from_secs(3600), max_items)
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let mut cache = hour_cache(10);
        assert!(cache.get("nonexistent_key").is_none());
    }

    #[test]
    fn test_get_returns_fresh_entry() {
        let mut cache = hour_cache(10);
        cache.insert("fresh_key", data("fresh", 100));

        assert_eq!(cache.get("fresh_key"), Some(data("fresh", 100)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_removed_on_lookup() {
        let mut cache: CacheManager<TestData> = CacheManager::new(StdDuration::ZERO, 10);
        cache.insert("expired_key", data("expired", 0));

        // Small delay to ensure expiry
        thread::sleep(StdDuration::from_millis(10));

        assert_eq!(cache.len(), 1, "Expiry is lazy until a lookup touches the key");
        assert!(cache.get("expired_key").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_rejected_entry_is_reported_as_evicted() {
        let mut cache = hour_cache(10);
        cache.insert("key", data("rejected", 1));

        let lookup = cache.lookup_with("key", |_| false);

        assert_eq!(lookup, Lookup::Evicted(data("rejected", 1)));
        assert!(!cache.contains_key("key"));
    }

    #[test]
    fn test_insert_evicts_oldest_when_full() {
        let mut cache = hour_cache(2);
        cache.insert("first", data("first", 1));
        thread::sleep(StdDuration::from_millis(5));
        cache.insert("second", data("second", 2));
        thread::sleep(StdDuration::from_millis(5));

        let evicted = cache.insert("third", data("third", 3));

        assert_eq!(evicted, vec![data("first", 1)]);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key("first"));
        assert!(cache.contains_key("second"));
        assert!(cache.contains_key("third"));
    }

    #[test]
    fn test_overwrite_existing_key_does_not_evict() {
        let mut cache = hour_cache(2);
        cache.insert("a", data("a", 1));
        cache.insert("b", data("b", 2));

        let evicted = cache.insert("a", data("a", 10));

        assert!(evicted.is_empty());
        assert_eq!(cache.get("a"), Some(data("a", 10)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_oversized_persisted_cache_shrinks_on_next_write() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("cache.json");

        let mut large = CacheManager::persistent(path.clone(), StdDuration::from_secs(3600), 10);
        for i in 0..5 {
            large.insert(&format!("key{}", i), data("item", i));
            thread::sleep(StdDuration::from_millis(2));
        }

        let mut small: CacheManager<TestData> =
            CacheManager::persistent(path, StdDuration::from_secs(3600), 3);
        assert_eq!(small.len(), 5);

        let evicted = small.insert("new", data("new", 99));

        assert_eq!(evicted.len(), 3);
        assert_eq!(small.len(), 3);
        assert!(small.contains_key("key3"));
        assert!(small.contains_key("key4"));
        assert!(small.contains_key("new"));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = hour_cache(0);
        cache.insert("key", data("x", 1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_persistent_cache_survives_restart() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested").join("responses.json");

        let mut cache = CacheManager::persistent(path.clone(), StdDuration::from_secs(3600), 10);
        cache.insert("roundtrip_key", data("roundtrip", 12345));
        assert!(path.exists(), "Cache file should be written through");

        let mut reloaded: CacheManager<TestData> =
            CacheManager::persistent(path, StdDuration::from_secs(3600), 10);
        assert_eq!(reloaded.get("roundtrip_key"), Some(data("roundtrip", 12345)));
    }

    #[test]
    fn test_persistent_removal_is_written_through() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("responses.json");

        let mut cache = CacheManager::persistent(path.clone(), StdDuration::from_secs(3600), 10);
        cache.insert("gone", data("gone", 1));
        cache.remove("gone");

        let reloaded: CacheManager<TestData> =
            CacheManager::persistent(path, StdDuration::from_secs(3600), 10);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_corrupt_cache_file_starts_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("responses.json");
        fs::write(&path, "{ not json").expect("Should write file");

        let mut cache: CacheManager<TestData> =
            CacheManager::persistent(path.clone(), StdDuration::from_secs(3600), 10);
        assert!(cache.is_empty());

        cache.insert("key", data("fresh", 1));
        let content = fs::read_to_string(&path).expect("Should read file");
        assert!(content.contains("\"fresh\""));
        assert!(content.contains("\"stored_at\""));
    }
}
