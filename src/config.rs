//! Configuration types for narration-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

/// Blob store configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket receiving synthesized artifacts (env: `GCS_BUCKET_NAME`)
    ///
    /// Required when a synthesis request is accepted.
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Voice selection for synthesis
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// BCP-47 language code (default: "en-US")
    #[serde(default = "default_language_code")]
    pub language_code: String,

    /// Voice name (default: "en-US-Standard-A")
    #[serde(default = "default_voice_name")]
    pub name: String,

    /// SSML gender (default: "NEUTRAL")
    #[serde(default = "default_ssml_gender")]
    pub ssml_gender: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language_code: default_language_code(),
            name: default_voice_name(),
            ssml_gender: default_ssml_gender(),
        }
    }
}

/// Output audio encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    /// MPEG layer III (default)
    #[default]
    Mp3,
    /// Uncompressed 16-bit PCM in a WAV container
    Linear16,
}

impl AudioEncoding {
    /// Name used by the synthesis API
    pub fn api_name(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "MP3",
            AudioEncoding::Linear16 => "LINEAR16",
        }
    }

    /// File extension of produced artifacts
    pub fn extension(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::Linear16 => "wav",
        }
    }

    /// Content type served on download
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "audio/mpeg",
            AudioEncoding::Linear16 => "audio/wav",
        }
    }
}

/// Synthesis job configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Job parent, e.g. `projects/my-project/locations/global` (env: `PARENT`)
    ///
    /// Required when a synthesis request is accepted.
    #[serde(default)]
    pub parent: Option<String>,

    /// Voice selection
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Output encoding
    #[serde(default)]
    pub audio_encoding: AudioEncoding,
}

/// Google Cloud endpoint and credential settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth2 bearer token sent to both APIs (env: `GOOGLE_ACCESS_TOKEN`)
    #[serde(default)]
    pub access_token: Option<String>,

    /// Text-to-Speech API base URL (default: "https://texttospeech.googleapis.com")
    #[serde(default = "default_tts_endpoint")]
    pub tts_endpoint: String,

    /// Cloud Storage API base URL (default: "https://storage.googleapis.com")
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,

    /// Timeout for non-streaming API requests (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            tts_endpoint: default_tts_endpoint(),
            storage_endpoint: default_storage_endpoint(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Operation polling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between status queries per operation (default: 5 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Capacity of each subscriber's event channel (default: 32)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// How long shutdown waits for pollers to stop (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            event_buffer: default_event_buffer(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Retry configuration for transient collaborator failures
///
/// Applied to job start and artifact purge. Status polling has its own
/// cadence and never uses backoff.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:3001, port from env `PORT`)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for the relay
///
/// Settings are grouped into sections:
/// - [`storage`](StorageConfig) - artifact bucket
/// - [`synthesis`](SynthesisConfig) - job parent, voice, encoding
/// - [`google`](GoogleConfig) - API endpoints and credentials
/// - [`polling`](PollingConfig) - status cadence and subscriber buffering
/// - [`retry`](RetryConfig) - backoff for job start and purge
/// - [`api`](ApiConfig) - HTTP server
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Blob store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Synthesis job settings
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Google Cloud API settings
    #[serde(default)]
    pub google: GoogleConfig,

    /// Polling settings
    #[serde(default)]
    pub polling: PollingConfig,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Build configuration from defaults overlaid with environment variables
    ///
    /// Recognized variables: `GCS_BUCKET_NAME`, `PARENT`, `GOOGLE_ACCESS_TOKEN`,
    /// `TTS_ENDPOINT`, `STORAGE_ENDPOINT`, `POLL_INTERVAL_SECS`, `PORT`.
    /// Missing required values are not an error here; they are reported by
    /// [`Config::require_bucket`] / [`Config::require_parent`] when a request
    /// needs them.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        config.storage.bucket = non_empty_var("GCS_BUCKET_NAME");
        config.synthesis.parent = non_empty_var("PARENT");
        config.google.access_token = non_empty_var("GOOGLE_ACCESS_TOKEN");

        if let Some(endpoint) = non_empty_var("TTS_ENDPOINT") {
            config.google.tts_endpoint = endpoint;
        }
        if let Some(endpoint) = non_empty_var("STORAGE_ENDPOINT") {
            config.google.storage_endpoint = endpoint;
        }

        if let Some(secs) = non_empty_var("POLL_INTERVAL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| Error::Config {
                message: format!("POLL_INTERVAL_SECS must be a positive integer, got '{secs}'"),
                key: Some("POLL_INTERVAL_SECS".into()),
            })?;
            if secs == 0 {
                return Err(Error::missing_config(
                    "POLL_INTERVAL_SECS",
                    "POLL_INTERVAL_SECS must be greater than zero",
                ));
            }
            config.polling.interval = Duration::from_secs(secs);
        }

        if let Some(port) = non_empty_var("PORT") {
            let port: u16 = port.parse().map_err(|_| Error::Config {
                message: format!("PORT must be a valid port number, got '{port}'"),
                key: Some("PORT".into()),
            })?;
            config.api.bind_address.set_port(port);
        }

        Ok(config)
    }

    /// The artifact bucket, or a configuration error when unset
    pub fn require_bucket(&self) -> Result<&str> {
        self.storage.bucket.as_deref().ok_or_else(|| {
            Error::missing_config(
                "GCS_BUCKET_NAME",
                "Server configuration error: GCS bucket not specified.",
            )
        })
    }

    /// The synthesis job parent, or a configuration error when unset
    pub fn require_parent(&self) -> Result<&str> {
        self.synthesis.parent.as_deref().ok_or_else(|| {
            Error::missing_config(
                "PARENT",
                "Server configuration error: Google Cloud project parent not specified.",
            )
        })
    }

    /// Names of required settings that are currently missing
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.storage.bucket.is_none() {
            missing.push("GCS_BUCKET_NAME");
        }
        if self.synthesis.parent.is_none() {
            missing.push("PARENT");
        }
        missing
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_language_code() -> String {
    "en-US".into()
}

fn default_voice_name() -> String {
    "en-US-Standard-A".into()
}

fn default_ssml_gender() -> String {
    "NEUTRAL".into()
}

fn default_tts_endpoint() -> String {
    "https://texttospeech.googleapis.com".into()
}

fn default_storage_endpoint() -> String {
    "https://storage.googleapis.com".into()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_event_buffer() -> usize {
    32
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
