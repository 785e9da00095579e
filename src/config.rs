//! Application configuration
//!
//! Settings are read once at startup from a TOML file, layered with
//! `CRYPTO_NARRATOR__SECTION__KEY` environment overrides, and validated before
//! any component is constructed. Every key has a fallback, so a partial file is
//! valid; a missing or unparseable file is not.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Prefix for environment variable overrides
const ENV_PREFIX: &str = "CRYPTO_NARRATOR";

/// Upper bound for any configured wait, in seconds
const MAX_WAIT_SECS: f64 = 3600.0;

/// Upper bound for the retry backoff factor
const MAX_BACKOFF_FACTOR: f64 = 10.0;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist
    #[error("Configuration file '{0}' not found")]
    NotFound(PathBuf),

    /// The configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    Parse(#[from] config::ConfigError),

    /// A value was parsed but is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Price API connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub price_endpoint: String,
    pub request_timeout_secs: u64,
    /// Minimum spacing between two dispatched requests
    pub min_request_interval_secs: f64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            price_endpoint: "/simple/price".to_string(),
            request_timeout_secs: 10,
            min_request_interval_secs: 1.0,
        }
    }
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        seconds(self.min_request_interval_secs)
    }
}

/// Retry and backoff settings for price API calls
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total number of attempts, including the first one
    pub max_retries: u32,
    pub initial_backoff_secs: f64,
    pub backoff_factor: f64,
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_secs: 1.0,
            backoff_factor: 2.0,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        seconds(self.initial_backoff_secs)
    }

    pub fn retryable_statuses(&self) -> HashSet<u16> {
        self.retryable_status_codes.iter().copied().collect()
    }
}

/// Values used when the user does not name an asset or currency
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultSettings {
    pub crypto_id: String,
    pub vs_currency: String,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            crypto_id: "bitcoin".to_string(),
            vs_currency: "usd".to_string(),
        }
    }
}

/// Narration defaults and audio file handling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NarrationSettings {
    pub lang: String,
    pub slow: bool,
    /// Keep the synthesized audio on disk when playback fails
    pub keep_audio_on_error: bool,
    /// Pause between successive narrations of a multi-asset report
    pub pause_secs: f64,
    /// Directory for generated audio; the platform cache directory when unset
    pub audio_dir: Option<PathBuf>,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            slow: false,
            keep_audio_on_error: false,
            pause_secs: 1.0,
            audio_dir: None,
        }
    }
}

impl NarrationSettings {
    pub fn pause(&self) -> Duration {
        seconds(self.pause_secs)
    }

    /// Resolves the audio directory, preferring the XDG cache location
    pub fn resolved_audio_dir(&self) -> PathBuf {
        if let Some(dir) = &self.audio_dir {
            return dir.clone();
        }
        match ProjectDirs::from("", "", "crypto-narrator") {
            Some(dirs) => dirs.cache_dir().join("audio"),
            None => std::env::temp_dir().join("crypto-narrator"),
        }
    }
}

/// Response and narration cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_items: usize,
    /// Persist the price response cache to this JSON file
    pub response_cache_file: Option<PathBuf>,
    /// Persist the narration cache index to this JSON file
    pub narration_cache_file: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_items: 100,
            response_cache_file: None,
            narration_cache_file: None,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// ElevenLabs speech engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElevenLabsSettings {
    pub enabled: bool,
    pub api_key: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f64,
    pub similarity_boost: f64,
    pub style: f64,
    pub use_speaker_boost: bool,
}

impl Default for ElevenLabsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.8,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

impl ElevenLabsSettings {
    /// True when enabled and carrying something other than the sample key
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty() && self.api_key != "your_api_key_here"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiSettings,
    pub retry: RetrySettings,
    pub defaults: DefaultSettings,
    pub narration: NarrationSettings,
    pub cache: CacheSettings,
    pub elevenlabs: ElevenLabsSettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Loads and validates configuration from a TOML file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` with fallbacks applied for absent keys
    /// * `Err(ConfigError::NotFound)` if the file does not exist
    /// * `Err(ConfigError::Parse)` if the file or an override cannot be parsed
    /// * `Err(ConfigError::Invalid)` if a value is out of range
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = settings.try_deserialize()?;
        app_config.validate()?;
        info!("Loaded configuration from '{}'", path.display());
        Ok(app_config)
    }

    /// Checks value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid("retry.max_retries must be at least 1".into()));
        }
        if !(1.0..=MAX_BACKOFF_FACTOR).contains(&self.retry.backoff_factor) {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_factor must be between 1.0 and {}",
                MAX_BACKOFF_FACTOR
            )));
        }
        let durations = [
            ("retry.initial_backoff_secs", self.retry.initial_backoff_secs),
            ("api.min_request_interval_secs", self.api.min_request_interval_secs),
            ("narration.pause_secs", self.narration.pause_secs),
        ];
        for (name, value) in durations {
            if !(0.0..=MAX_WAIT_SECS).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0 and {} seconds",
                    name, MAX_WAIT_SECS
                )));
            }
        }
        if let Some(code) = self
            .retry
            .retryable_status_codes
            .iter()
            .find(|code| !(100..=599).contains(*code))
        {
            return Err(ConfigError::Invalid(format!(
                "retry.retryable_status_codes contains invalid HTTP status {}",
                code
            )));
        }
        Ok(())
    }
}

/// Seconds as a `Duration`; out-of-range values saturate instead of panicking
fn seconds(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("Failed to create temp config");
        file.write_all(contents.as_bytes()).expect("Failed to write config");
        file
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let result = AppConfig::load(Path::new("/definitely/not/here/config.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_empty_file_uses_fallbacks() {
        let file = write_config("");
        let config = AppConfig::load(file.path()).expect("Empty config should load");

        assert_eq!(config.api.base_url, "https://api.coingecko.com/api/v3");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff(), Duration::from_secs(1));
        assert!((config.retry.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(
            config.retry.retryable_statuses(),
            [429, 500, 502, 503, 504].into_iter().collect()
        );
        assert_eq!(config.defaults.crypto_id, "bitcoin");
        assert_eq!(config.defaults.vs_currency, "usd");
        assert_eq!(config.narration.lang, "en");
        assert!(!config.narration.slow);
        assert!(!config.narration.keep_audio_on_error);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.max_items, 100);
    }

    #[test]
    fn test_partial_file_overrides_only_named_keys() {
        let file = write_config(
            r#"
[retry]
max_retries = 5
retryable_status_codes = [503]

[defaults]
vs_currency = "eur"
"#,
        );
        let config = AppConfig::load(file.path()).expect("Partial config should load");

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.retryable_statuses(), [503].into_iter().collect());
        assert!((config.retry.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.defaults.vs_currency, "eur");
        assert_eq!(config.defaults.crypto_id, "bitcoin");
    }

    #[test]
    fn test_corrupt_file_is_parse_error() {
        let file = write_config("[retry\nmax_retries = = 3");
        let result = AppConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_retries_is_invalid() {
        let file = write_config("[retry]\nmax_retries = 0\n");
        let result = AppConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_shrinking_backoff_is_invalid() {
        let mut config = AppConfig::default();
        config.retry.backoff_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_absurd_backoff_values_are_invalid() {
        let mut config = AppConfig::default();
        config.retry.backoff_factor = 1e20;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retry.initial_backoff_secs = 1e20;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retry.backoff_factor = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unvalidated_durations_saturate() {
        let mut config = AppConfig::default();
        config.retry.initial_backoff_secs = 1e30;
        config.narration.pause_secs = -1.0;
        config.api.min_request_interval_secs = f64::NAN;

        assert_eq!(config.retry.initial_backoff(), Duration::MAX);
        assert_eq!(config.narration.pause(), Duration::ZERO);
        assert_eq!(config.api.min_request_interval(), Duration::ZERO);
    }

    #[test]
    fn test_out_of_range_status_is_invalid() {
        let mut config = AppConfig::default();
        config.retry.retryable_status_codes = vec![500, 42];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_elevenlabs_placeholder_key_is_unusable() {
        let mut settings = ElevenLabsSettings {
            enabled: true,
            api_key: "your_api_key_here".to_string(),
            ..Default::default()
        };
        assert!(!settings.is_usable());

        settings.api_key = "sk_live".to_string();
        assert!(settings.is_usable());

        settings.enabled = false;
        assert!(!settings.is_usable());
    }

    #[test]
    fn test_audio_dir_override_is_respected() {
        let settings = NarrationSettings {
            audio_dir: Some(PathBuf::from("/tmp/narrations")),
            ..Default::default()
        };
        assert_eq!(settings.resolved_audio_dir(), PathBuf::from("/tmp/narrations"));
    }
}
