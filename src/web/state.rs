//! Shared state of the HTTP service
//!
//! The fetcher's response cache is not safe for concurrent use on its own,
//! so the fetcher sits behind an async mutex: requests that need prices are
//! served one at a time.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::audio_store::{AudioStore, AUDIO_TTL};
use crate::config::AppConfig;
use crate::data::{FetcherSettings, PriceFetcher};
use crate::narrator::{synthesizer_from_config, NarratorSettings, SpeechSynthesizer};

#[derive(Debug, Error)]
#[error("Failed to build HTTP client: {0}")]
pub struct StateError(#[from] reqwest::Error);

/// Values used when a request leaves a field out
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub crypto_id: String,
    pub vs_currency: String,
    pub lang: String,
    pub slow: bool,
}

impl From<&AppConfig> for RequestDefaults {
    fn from(config: &AppConfig) -> Self {
        Self {
            crypto_id: config.defaults.crypto_id.clone(),
            vs_currency: config.defaults.vs_currency.clone(),
            lang: config.narration.lang.clone(),
            slow: config.narration.slow,
        }
    }
}

pub struct AppState {
    pub fetcher: tokio::sync::Mutex<PriceFetcher>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub audio: Mutex<AudioStore>,
    pub defaults: RequestDefaults,
}

impl AppState {
    pub fn new(
        fetcher: PriceFetcher,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        audio: AudioStore,
        defaults: RequestDefaults,
    ) -> Self {
        Self {
            fetcher: tokio::sync::Mutex::new(fetcher),
            synthesizer,
            audio: Mutex::new(audio),
            defaults,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, StateError> {
        let fetcher = PriceFetcher::new(FetcherSettings::from(config))?;
        let narration = NarratorSettings::from(config);
        let synthesizer = synthesizer_from_config(&config.elevenlabs, narration.synthesis_timeout)?;
        let audio = AudioStore::new(narration.audio_dir.join("web"), AUDIO_TTL);

        Ok(Self::new(fetcher, synthesizer, audio, RequestDefaults::from(config)))
    }
}
