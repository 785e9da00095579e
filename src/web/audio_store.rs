//! Expiring storage for audio generated by the HTTP API
//!
//! Each file gets a random id and lives for [`AUDIO_TTL`]. Expired files are
//! removed when new audio is stored and when an expired id is looked up.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// How long generated audio stays downloadable
pub const AUDIO_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioLookupError {
    #[error("Invalid file ID")]
    Unknown,

    #[error("Audio file has expired")]
    Expired,

    #[error("Audio file not found")]
    Missing,
}

#[derive(Debug, Clone)]
struct StoredAudio {
    path: PathBuf,
    expires_at: Instant,
}

/// Audio files addressed by id, each with an expiry time
#[derive(Debug)]
pub struct AudioStore {
    dir: PathBuf,
    ttl: Duration,
    files: HashMap<String, StoredAudio>,
}

impl AudioStore {
    pub fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self {
            dir,
            ttl,
            files: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Writes `audio` under a fresh id and returns the id
    pub fn store(&mut self, audio: &[u8]) -> io::Result<String> {
        self.remove_expired(Instant::now());

        fs::create_dir_all(&self.dir)?;
        let file_id = Uuid::new_v4().to_string();
        let path = self.dir.join(format!("narration_{}.mp3", file_id));
        fs::write(&path, audio)?;

        debug!("Stored {} bytes of audio as {}", audio.len(), file_id);
        self.files.insert(
            file_id.clone(),
            StoredAudio {
                path,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(file_id)
    }

    /// Path of a live audio file
    pub fn lookup(&mut self, file_id: &str) -> Result<PathBuf, AudioLookupError> {
        let stored = self.files.get(file_id).cloned().ok_or(AudioLookupError::Unknown)?;

        if Instant::now() > stored.expires_at {
            self.files.remove(file_id);
            remove_file(&stored.path);
            return Err(AudioLookupError::Expired);
        }
        if !stored.path.exists() {
            self.files.remove(file_id);
            return Err(AudioLookupError::Missing);
        }
        Ok(stored.path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn remove_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .files
            .iter()
            .filter(|(_, stored)| now > stored.expires_at)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(stored) = self.files.remove(&id) {
                remove_file(&stored.path);
            }
        }
    }
}

fn remove_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed expired audio file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Error removing expired file {}: {}", path.display(), e),
    }
}
