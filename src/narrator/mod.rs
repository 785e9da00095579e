//! Spoken narration of prices
//!
//! [`Narrator`] turns text into audio through a [`SpeechSynthesizer`], plays
//! it through an [`AudioPlayer`] and reuses earlier audio for identical
//! requests. Every public operation reports success as a value; failures are
//! logged, never returned.

pub mod cache;
pub mod playback;
pub mod text;
pub mod tts;

pub use cache::NarrationCache;
pub use playback::{AudioPlayer, CommandRunner, PlaybackError, ProcessRunner, SystemPlayer};
pub use tts::{synthesizer_from_config, SpeechSynthesizer, SynthesisError};

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::data::{ChangeWindow, PriceResult};
use crate::pacing::{Sleeper, TokioSleeper};

/// Errors inside a single narration
#[derive(Debug, Error)]
pub enum NarrationError {
    #[error("Nothing to narrate")]
    EmptyText,

    #[error("Speech synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Could not write audio: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-call narration parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationOptions {
    pub lang: String,
    pub slow: bool,
    /// Skip the cache lookup; a successful synthesis still refreshes it
    pub force_new: bool,
    /// Keep uncached audio on disk when playback fails
    pub keep_on_error: bool,
}

impl Default for NarrationOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            slow: false,
            force_new: false,
            keep_on_error: false,
        }
    }
}

/// Narrator configuration
#[derive(Debug, Clone)]
pub struct NarratorSettings {
    pub pause: Duration,
    pub audio_dir: PathBuf,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_max_items: usize,
    pub cache_file: Option<PathBuf>,
    pub synthesis_timeout: Duration,
}

impl From<&AppConfig> for NarratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            pause: config.narration.pause(),
            audio_dir: config.narration.resolved_audio_dir(),
            cache_enabled: config.cache.enabled,
            cache_ttl: config.cache.ttl(),
            cache_max_items: config.cache.max_items,
            cache_file: config.cache.narration_cache_file.clone(),
            synthesis_timeout: config.api.request_timeout().max(Duration::from_secs(30)),
        }
    }
}

/// Synthesizes, caches and plays narrations
pub struct Narrator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    sleeper: Arc<dyn Sleeper>,
    cache: Option<NarrationCache>,
    audio_dir: PathBuf,
    pause: Duration,
}

impl Narrator {
    /// Creates a narrator using the configured speech engine, the system
    /// audio players and real sleeps
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let settings = NarratorSettings::from(config);
        let synthesizer = synthesizer_from_config(&config.elevenlabs, settings.synthesis_timeout)?;
        Ok(Self::new(
            settings,
            synthesizer,
            Arc::new(SystemPlayer::new()),
            Arc::new(TokioSleeper),
        ))
    }

    pub fn new(
        settings: NarratorSettings,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        // A cache that can hold nothing would leave its audio files unowned
        let use_cache = settings.cache_enabled && settings.cache_max_items > 0;
        let cache = use_cache.then(|| match settings.cache_file.clone() {
            Some(index) => NarrationCache::persistent(
                index,
                settings.audio_dir.clone(),
                settings.cache_ttl,
                settings.cache_max_items,
            ),
            None => NarrationCache::new(settings.audio_dir.clone(), settings.cache_ttl, settings.cache_max_items),
        });

        Self {
            synthesizer,
            player,
            sleeper,
            cache,
            audio_dir: settings.audio_dir,
            pause: settings.pause,
        }
    }

    pub fn cached_narrations(&self) -> usize {
        self.cache.as_ref().map_or(0, NarrationCache::len)
    }

    /// Speaks `text`, reusing cached audio when allowed
    ///
    /// # Returns
    /// * `true` if audio was produced and played
    /// * `false` on synthesis or playback failure (already logged)
    pub async fn narrate_text(&mut self, text: &str, options: &NarrationOptions) -> bool {
        info!("Narrating: {}", text);
        match self.speak(text, options).await {
            Ok(()) => true,
            Err(NarrationError::Playback(PlaybackError::Exhausted { path, tried })) => {
                error!(
                    "Could not play audio with any of [{}]; the file is at {}",
                    tried.join(", "),
                    path.display()
                );
                false
            }
            Err(e) => {
                error!("Narration failed: {}", e);
                false
            }
        }
    }

    /// Speaks "The current price for {name} is {price} {CURRENCY}."
    pub async fn narrate_price(
        &mut self,
        asset_name: &str,
        price: f64,
        currency: &str,
        options: &NarrationOptions,
    ) -> bool {
        let sentence = text::price_sentence(asset_name, price, currency);
        self.narrate_text(&sentence, options).await
    }

    /// Speaks a price followed by whichever requested changes it carries
    pub async fn narrate_price_with_change(
        &mut self,
        result: &PriceResult,
        windows: &BTreeSet<ChangeWindow>,
        options: &NarrationOptions,
    ) -> bool {
        match text::price_narration(result, windows) {
            Some(narration) if result.success => self.narrate_text(&narration, options).await,
            _ => {
                warn!("No price to narrate for {}", result.asset_name);
                false
            }
        }
    }

    /// Speaks several prices in order, with an optional intro and a closing
    /// sentence when more than one asset was spoken
    ///
    /// Results without a price are skipped. A pause separates successive
    /// utterances.
    ///
    /// # Returns
    /// Number of assets narrated successfully
    pub async fn narrate_multiple(
        &mut self,
        results: &[PriceResult],
        windows: &BTreeSet<ChangeWindow>,
        narrate_intro: bool,
        options: &NarrationOptions,
    ) -> usize {
        let mut spoken_before = false;

        if narrate_intro && !results.is_empty() {
            let intro = text::intro_sentence(results.len());
            self.utter(&intro, options, &mut spoken_before).await;
        }

        let mut successes = 0;
        for result in results {
            let narration = match text::price_narration(result, windows) {
                Some(narration) if result.success => narration,
                _ => {
                    debug!("Skipping {}: no price", result.asset_name);
                    continue;
                }
            };
            if self.utter(&narration, options, &mut spoken_before).await {
                successes += 1;
            }
        }

        if successes > 1 {
            let closing = text::closing_sentence(successes);
            self.utter(&closing, options, &mut spoken_before).await;
        }

        info!("Narrated {} of {} prices", successes, results.len());
        successes
    }

    async fn utter(&mut self, text: &str, options: &NarrationOptions, spoken_before: &mut bool) -> bool {
        if *spoken_before && !self.pause.is_zero() {
            self.sleeper.sleep(self.pause).await;
        }
        *spoken_before = true;
        self.narrate_text(text, options).await
    }

    async fn speak(&mut self, text: &str, options: &NarrationOptions) -> Result<(), NarrationError> {
        if text.trim().is_empty() {
            return Err(NarrationError::EmptyText);
        }
        let key = NarrationCache::key(text, &options.lang, options.slow);

        if let Some(cache) = self.cache.as_mut() {
            if !options.force_new {
                if let Some(path) = cache.lookup(&key) {
                    info!("Playing cached narration");
                    return self.player.play(&path).await.map_err(NarrationError::from);
                }
            }

            let audio = self
                .synthesizer
                .synthesize(text, &options.lang, options.slow)
                .await?;
            let path = cache.audio_path_for(&key);
            fs::create_dir_all(cache.audio_dir())?;
            tokio::fs::write(&path, &audio).await?;
            cache.store(&key, path.clone());
            debug!("Cached {} bytes of {} audio at {}", audio.len(), self.synthesizer.name(), path.display());

            return self.player.play(&path).await.map_err(NarrationError::from);
        }

        self.speak_uncached(text, &key, options).await
    }

    /// Synthesizes into a unique temporary file that is removed afterwards,
    /// unless playback fails and `keep_on_error` is set
    async fn speak_uncached(&self, text: &str, key: &str, options: &NarrationOptions) -> Result<(), NarrationError> {
        let audio = self
            .synthesizer
            .synthesize(text, &options.lang, options.slow)
            .await?;

        fs::create_dir_all(&self.audio_dir)?;
        let prefix = format!("narration_{}_", key.get(..16).unwrap_or(key));
        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".mp3")
            .tempfile_in(&self.audio_dir)?;
        tokio::fs::write(temp.path(), &audio).await?;

        match self.player.play(temp.path()).await {
            Ok(()) => Ok(()),
            Err(e) if options.keep_on_error => {
                match temp.into_temp_path().keep() {
                    Ok(kept) => warn!("Keeping audio at {}", kept.display()),
                    Err(keep_err) => warn!("Could not keep audio file: {}", keep_err),
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::RecordingSleeper;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records requested texts; fails for texts containing `fail_on`
    #[derive(Default)]
    struct FakeSynth {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl FakeSynth {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynth {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn synthesize(&self, text: &str, _lang: &str, _slow: bool) -> Result<Vec<u8>, SynthesisError> {
            self.calls.lock().unwrap().push(text.to_string());
            match self.fail_on {
                Some(needle) if text.contains(needle) => Err(SynthesisError::EmptyAudio),
                _ => Ok(b"ID3fake".to_vec()),
            }
        }
    }

    /// Records played files; fails every playback when `broken`
    #[derive(Default)]
    struct FakePlayer {
        played: Mutex<Vec<PathBuf>>,
        broken: bool,
    }

    #[async_trait]
    impl AudioPlayer for FakePlayer {
        async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
            assert!(path.exists(), "Audio should exist while playing");
            self.played.lock().unwrap().push(path.to_path_buf());
            if self.broken {
                Err(PlaybackError::Exhausted {
                    path: path.to_path_buf(),
                    tried: vec!["fake".to_string()],
                })
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        narrator: Narrator,
        synth: Arc<FakeSynth>,
        player: Arc<FakePlayer>,
        sleeper: RecordingSleeper,
        dir: TempDir,
    }

    fn harness(cache_enabled: bool, synth: FakeSynth, player: FakePlayer) -> Harness {
        harness_with_capacity(cache_enabled, 100, synth, player)
    }

    fn harness_with_capacity(
        cache_enabled: bool,
        cache_max_items: usize,
        synth: FakeSynth,
        player: FakePlayer,
    ) -> Harness {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let settings = NarratorSettings {
            pause: Duration::from_millis(750),
            audio_dir: dir.path().join("audio"),
            cache_enabled,
            cache_ttl: Duration::from_secs(300),
            cache_max_items,
            cache_file: None,
            synthesis_timeout: Duration::from_secs(1),
        };
        let synth = Arc::new(synth);
        let player = Arc::new(player);
        let sleeper = RecordingSleeper::new();
        let narrator = Narrator::new(settings, synth.clone(), player.clone(), Arc::new(sleeper.clone()));
        Harness {
            narrator,
            synth,
            player,
            sleeper,
            dir,
        }
    }

    fn audio_files(dir: &TempDir) -> usize {
        fs::read_dir(dir.path().join("audio"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_repeated_text_is_synthesized_once() {
        let mut h = harness(true, FakeSynth::default(), FakePlayer::default());
        let options = NarrationOptions::default();

        assert!(h.narrator.narrate_text("Hello there", &options).await);
        assert!(h.narrator.narrate_text("Hello there", &options).await);

        assert_eq!(h.synth.calls().len(), 1);
        assert_eq!(h.player.played.lock().unwrap().len(), 2);
        assert_eq!(h.narrator.cached_narrations(), 1);
    }

    #[tokio::test]
    async fn test_language_or_speed_change_resynthesizes() {
        let mut h = harness(true, FakeSynth::default(), FakePlayer::default());
        let options = NarrationOptions::default();
        let slow = NarrationOptions {
            slow: true,
            ..NarrationOptions::default()
        };
        let french = NarrationOptions {
            lang: "fr".to_string(),
            ..NarrationOptions::default()
        };

        h.narrator.narrate_text("Bonjour", &options).await;
        h.narrator.narrate_text("Bonjour", &slow).await;
        h.narrator.narrate_text("Bonjour", &french).await;

        assert_eq!(h.synth.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_force_new_bypasses_and_refreshes_cache() {
        let mut h = harness(true, FakeSynth::default(), FakePlayer::default());
        let forced = NarrationOptions {
            force_new: true,
            ..NarrationOptions::default()
        };

        h.narrator.narrate_text("Hello", &NarrationOptions::default()).await;
        h.narrator.narrate_text("Hello", &forced).await;
        h.narrator.narrate_text("Hello", &NarrationOptions::default()).await;

        assert_eq!(h.synth.calls().len(), 2);
        assert_eq!(h.narrator.cached_narrations(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_resynthesizes() {
        let mut h = harness(true, FakeSynth::default(), FakePlayer::default());
        h.narrator.cache = Some(NarrationCache::new(
            h.dir.path().join("audio"),
            Duration::from_millis(1),
            10,
        ));
        let options = NarrationOptions::default();

        h.narrator.narrate_text("Hello", &options).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.narrator.narrate_text("Hello", &options).await;

        assert_eq!(h.synth.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_synthesis_failure_returns_false() {
        let synth = FakeSynth {
            fail_on: Some("Hello"),
            ..FakeSynth::default()
        };
        let mut h = harness(true, synth, FakePlayer::default());

        assert!(!h.narrator.narrate_text("Hello", &NarrationOptions::default()).await);
        assert!(h.player.played.lock().unwrap().is_empty());
        assert_eq!(h.narrator.cached_narrations(), 0);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let mut h = harness(true, FakeSynth::default(), FakePlayer::default());
        assert!(!h.narrator.narrate_text("   ", &NarrationOptions::default()).await);
        assert!(h.synth.calls().is_empty());
    }

    #[tokio::test]
    async fn test_uncached_audio_is_removed_after_playback() {
        let mut h = harness(false, FakeSynth::default(), FakePlayer::default());

        assert!(h.narrator.narrate_text("Hello", &NarrationOptions::default()).await);
        assert!(h.narrator.narrate_text("Hello", &NarrationOptions::default()).await);

        assert_eq!(h.synth.calls().len(), 2);
        assert_eq!(audio_files(&h.dir), 0);
        let played = h.player.played.lock().unwrap();
        assert_ne!(played[0], played[1], "Each narration gets its own file");
    }

    #[tokio::test]
    async fn test_zero_capacity_cache_leaves_no_audio_behind() {
        let mut h = harness_with_capacity(true, 0, FakeSynth::default(), FakePlayer::default());
        let options = NarrationOptions::default();

        for text in ["One", "Two", "Three"] {
            assert!(h.narrator.narrate_text(text, &options).await);
        }

        assert_eq!(h.synth.calls().len(), 3);
        assert_eq!(h.narrator.cached_narrations(), 0);
        assert_eq!(audio_files(&h.dir), 0);
    }

    #[tokio::test]
    async fn test_uncached_audio_kept_on_playback_error_when_asked() {
        let player = FakePlayer {
            broken: true,
            ..FakePlayer::default()
        };
        let mut h = harness(false, FakeSynth::default(), player);
        let keep = NarrationOptions {
            keep_on_error: true,
            ..NarrationOptions::default()
        };

        assert!(!h.narrator.narrate_text("Hello", &NarrationOptions::default()).await);
        assert_eq!(audio_files(&h.dir), 0);

        assert!(!h.narrator.narrate_text("Hello", &keep).await);
        assert_eq!(audio_files(&h.dir), 1);
    }

    #[tokio::test]
    async fn test_narrate_price_text() {
        let mut h = harness(true, FakeSynth::default(), FakePlayer::default());

        assert!(
            h.narrator
                .narrate_price("Bitcoin", 60000.75, "usd", &NarrationOptions::default())
                .await
        );
        assert_eq!(
            h.synth.calls(),
            vec!["The current price for Bitcoin is 60,000.75 USD.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_narrate_price_with_change_requires_price() {
        let mut h = harness(true, FakeSynth::default(), FakePlayer::default());
        let failed = PriceResult::failed("bitcoin", "usd", "not found");

        let ok = h
            .narrator
            .narrate_price_with_change(&failed, &BTreeSet::new(), &NarrationOptions::default())
            .await;

        assert!(!ok);
        assert!(h.synth.calls().is_empty());
    }

    fn two_prices() -> Vec<PriceResult> {
        let mut bitcoin = PriceResult::priced("bitcoin", "usd", 60000.75);
        bitcoin.change_24h = Some(2.0);
        let ethereum = PriceResult::priced("ethereum", "usd", 3000.0);
        vec![bitcoin, ethereum]
    }

    #[tokio::test]
    async fn test_narrate_multiple_speaks_four_utterances() {
        let mut h = harness(true, FakeSynth::default(), FakePlayer::default());
        let windows = [ChangeWindow::Day].into_iter().collect();

        let count = h
            .narrator
            .narrate_multiple(&two_prices(), &windows, true, &NarrationOptions::default())
            .await;

        assert_eq!(count, 2);
        let calls = h.synth.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], "Here are the current prices for 2 cryptocurrencies.");
        assert!(calls[1].starts_with("The current price for Bitcoin"));
        assert!(calls[1].contains("24 hours"));
        assert!(calls[2].starts_with("The current price for Ethereum"));
        assert!(calls[3].contains("concludes"));
        assert_eq!(h.sleeper.calls(), vec![Duration::from_millis(750); 3]);
    }

    #[tokio::test]
    async fn test_narrate_multiple_omits_closing_after_one_success() {
        let synth = FakeSynth {
            fail_on: Some("Ethereum"),
            ..FakeSynth::default()
        };
        let mut h = harness(true, synth, FakePlayer::default());

        let count = h
            .narrator
            .narrate_multiple(&two_prices(), &BTreeSet::new(), true, &NarrationOptions::default())
            .await;

        assert_eq!(count, 1);
        assert_eq!(h.synth.calls().len(), 3);
        assert!(!h.synth.calls().iter().any(|c| c.contains("concludes")));
    }

    #[tokio::test]
    async fn test_narrate_multiple_skips_failed_fetches() {
        let mut h = harness(true, FakeSynth::default(), FakePlayer::default());
        let results = vec![
            PriceResult::priced("bitcoin", "usd", 1.0),
            PriceResult::failed("doesnotexist", "usd", "not found"),
        ];

        let count = h
            .narrator
            .narrate_multiple(&results, &BTreeSet::new(), false, &NarrationOptions::default())
            .await;

        assert_eq!(count, 1);
        assert_eq!(h.synth.calls().len(), 1);
        assert!(h.sleeper.calls().is_empty());
    }
}
