//! Narration audio cache
//!
//! Entries map a content key (sha256 of text, language and speed) to an
//! audio file under the audio directory. The cache owns those files: an
//! entry is usable only while its file exists, and evicting an entry deletes
//! its file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::{CacheManager, Lookup};

/// Where a cached narration's audio lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationEntry {
    pub audio_path: PathBuf,
}

/// Cache of synthesized narrations keyed by content
#[derive(Debug)]
pub struct NarrationCache {
    entries: CacheManager<NarrationEntry>,
    audio_dir: PathBuf,
}

impl NarrationCache {
    pub fn new(audio_dir: PathBuf, ttl: Duration, max_items: usize) -> Self {
        Self {
            entries: CacheManager::new(ttl, max_items),
            audio_dir,
        }
    }

    /// Creates a cache whose index is persisted to `index_file`
    pub fn persistent(index_file: PathBuf, audio_dir: PathBuf, ttl: Duration, max_items: usize) -> Self {
        Self {
            entries: CacheManager::persistent(index_file, ttl, max_items),
            audio_dir,
        }
    }

    /// Deterministic key for a narration request
    pub fn key(text: &str, lang: &str, slow: bool) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
        hasher.update(lang.as_bytes());
        hasher.update([0u8]);
        hasher.update(if slow { b"slow" as &[u8] } else { b"normal" });
        format!("{:x}", hasher.finalize())
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// File a narration with this key is written to
    pub fn audio_path_for(&self, key: &str) -> PathBuf {
        self.audio_dir.join(format!("narration_{}.mp3", key))
    }

    /// Path of a valid cached narration, if any
    ///
    /// Expired entries and entries whose file has disappeared are removed.
    pub fn lookup(&mut self, key: &str) -> Option<PathBuf> {
        match self.entries.lookup_with(key, |entry| entry.audio_path.exists()) {
            Lookup::Hit(entry) => {
                debug!("Narration cache hit for {}", short(key));
                Some(entry.audio_path)
            }
            Lookup::Evicted(entry) => {
                debug!("Narration cache entry {} is stale", short(key));
                remove_audio(&entry.audio_path);
                None
            }
            Lookup::Miss => None,
        }
    }

    /// Records `audio_path` for `key`, deleting the files of any entries
    /// evicted to make room
    pub fn store(&mut self, key: &str, audio_path: PathBuf) {
        let evicted = self.entries.insert(
            key,
            NarrationEntry {
                audio_path: audio_path.clone(),
            },
        );
        for entry in evicted {
            if entry.audio_path != audio_path {
                remove_audio(&entry.audio_path);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn remove_audio(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed cached audio {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove cached audio {}: {}", path.display(), e),
    }
}

fn short(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}
