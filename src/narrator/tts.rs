//! Text-to-speech engines
//!
//! Two engines produce MP3 audio:
//!
//! - [`GoogleTts`]: the Google Translate speech endpoint. Needs no key, but
//!   only accepts short utterances, so text is split into chunks of at most
//!   [`GOOGLE_MAX_CHUNK_CHARS`] characters whose MP3 frames are concatenated.
//! - [`ElevenLabsTts`]: the ElevenLabs text-to-speech API, used when a real
//!   API key is configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ElevenLabsSettings;

const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";
const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1";

/// Longest text Google accepts in one request
pub const GOOGLE_MAX_CHUNK_CHARS: usize = 100;

/// Errors raised by a speech engine
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Nothing to synthesize")]
    EmptyText,

    #[error("Speech request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Speech service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Speech service returned no audio")]
    EmptyAudio,
}

/// Converts text to audio bytes
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &'static str;

    /// Returns MP3 audio for `text` spoken in `lang`
    async fn synthesize(&self, text: &str, lang: &str, slow: bool) -> Result<Vec<u8>, SynthesisError>;
}

/// Google Translate speech engine
#[derive(Debug, Clone)]
pub struct GoogleTts {
    client: Client,
    endpoint: String,
}

impl GoogleTts {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; crypto-narrator)")
            .build()?;
        Ok(Self {
            client,
            endpoint: GOOGLE_TTS_URL.to_string(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn synthesize(&self, text: &str, lang: &str, slow: bool) -> Result<Vec<u8>, SynthesisError> {
        let chunks = chunk_text(text, GOOGLE_MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let speed = if slow { "0.3" } else { "1" };
        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let index = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            debug!("Requesting speech chunk {}/{} ({} chars)", idx + 1, total, textlen);
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("ie", "UTF-8"),
                    ("q", chunk.as_str()),
                    ("tl", lang),
                    ("client", "tw-ob"),
                    ("ttsspeed", speed),
                    ("total", total.as_str()),
                    ("idx", index.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(SynthesisError::Status {
                    status: status.as_u16(),
                    message: truncate(&message, 200),
                });
            }
            audio.extend_from_slice(&response.bytes().await?);
        }

        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(audio)
    }
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
    style: f64,
    use_speaker_boost: bool,
}

#[derive(Debug, Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

/// ElevenLabs speech engine
///
/// The multilingual model picks the language from the text itself, so `lang`
/// is not sent. The speaking rate is fixed by the voice.
#[derive(Debug)]
pub struct ElevenLabsTts {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
    voice_settings: VoiceSettings,
}

impl ElevenLabsTts {
    pub fn new(settings: &ElevenLabsSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            voice_id: settings.voice_id.clone(),
            model_id: settings.model_id.clone(),
            voice_settings: VoiceSettings {
                stability: settings.stability,
                similarity_boost: settings.similarity_boost,
                style: settings.style,
                use_speaker_boost: settings.use_speaker_boost,
            },
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsTts {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str, _lang: &str, slow: bool) -> Result<Vec<u8>, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        if slow {
            debug!("ElevenLabs ignores the slow flag");
        }

        let url = format!("{}/text-to-speech/{}", ELEVENLABS_API_URL, self.voice_id);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model_id,
                voice_settings: &self.voice_settings,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(audio.to_vec())
    }
}

/// Picks the configured speech engine
///
/// ElevenLabs is used only when enabled with a usable key; an enabled but
/// unusable configuration falls back to Google with a warning.
pub fn synthesizer_from_config(
    settings: &ElevenLabsSettings,
    timeout: Duration,
) -> Result<Arc<dyn SpeechSynthesizer>, reqwest::Error> {
    if settings.is_usable() {
        info!("Using ElevenLabs speech with voice {}", settings.voice_id);
        return Ok(Arc::new(ElevenLabsTts::new(settings, timeout)?));
    }
    if settings.enabled {
        warn!("ElevenLabs is enabled but no API key is configured; using Google speech");
    }
    Ok(Arc::new(GoogleTts::new(timeout)?))
}

/// Splits text into pieces of at most `max_chars` characters, breaking at
/// whitespace where possible and hard-splitting words that are too long.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
