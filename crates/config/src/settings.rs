//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// External provider configuration
    #[serde(default)]
    pub providers: ProviderConfig,

    /// Semantic response cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.heartbeat_interval_secs".to_string(),
                message: "Heartbeat interval must be at least 1 second".to_string(),
            });
        }

        let threshold = self.cache.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                field: "cache.similarity_threshold".to_string(),
                message: format!("Cosine similarity threshold out of range: {threshold}"),
            });
        }

        if self.providers.search.max_results == 0 {
            return Err(ConfigError::InvalidValue {
                field: "providers.search.max_results".to_string(),
                message: "Search must request at least one result".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Liveness sweep interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Enable permissive CORS (development)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_max_sessions() -> usize {
    100
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            max_sessions: default_max_sessions(),
            cors_enabled: default_true(),
        }
    }
}

/// External provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Text generation
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Speech synthesis
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Streaming transcription
    #[serde(default)]
    pub stt: SttConfig,

    /// Web search grounding
    #[serde(default)]
    pub search: SearchConfig,

    /// Text embeddings (semantic cache)
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Warm providers at startup
    #[serde(default = "default_true")]
    pub prewarm_enabled: bool,

    /// Cap on each prewarm call, in seconds
    #[serde(default = "default_prewarm_timeout")]
    pub prewarm_timeout_secs: u64,
}

fn default_prewarm_timeout() -> u64 {
    5
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            synthesis: SynthesisConfig::default(),
            stt: SttConfig::default(),
            search: SearchConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            prewarm_enabled: default_true(),
            prewarm_timeout_secs: default_prewarm_timeout(),
        }
    }
}

/// One OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEndpoint {
    /// API base URL (an OpenAI-compatible `/chat/completions` lives under it)
    pub base_url: String,

    /// Bearer token; absent means the endpoint is not configured
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,
}

impl ChatEndpoint {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Text generation configuration: an ordered fallback pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Primary endpoint, tried first
    #[serde(default = "default_primary_endpoint")]
    pub primary: ChatEndpoint,

    /// Secondary endpoint, tried when the primary fails
    #[serde(default = "default_secondary_endpoint")]
    pub secondary: ChatEndpoint,

    /// System preamble prepended to every prompt
    #[serde(default = "default_system_preamble")]
    pub system_preamble: String,
}

fn default_primary_endpoint() -> ChatEndpoint {
    ChatEndpoint {
        base_url: "https://api.groq.com/openai/v1".to_string(),
        api_key: None,
        model: "llama-3.1-8b-instant".to_string(),
    }
}

fn default_secondary_endpoint() -> ChatEndpoint {
    ChatEndpoint {
        base_url: "https://api.openai.com/v1".to_string(),
        api_key: None,
        model: "gpt-4o-mini".to_string(),
    }
}

fn default_system_preamble() -> String {
    "You are a helpful, concise voice assistant. Keep responses short and conversational."
        .to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_endpoint(),
            secondary: default_secondary_endpoint(),
            system_preamble: default_system_preamble(),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Synthesis endpoint URL
    #[serde(default = "default_synthesis_url")]
    pub base_url: String,

    /// API key; absent selects the tone-generator stand-in
    #[serde(default)]
    pub api_key: Option<String>,

    /// Voice model identifier
    #[serde(default = "default_synthesis_model")]
    pub model: String,

    /// Output sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_synthesis_url() -> String {
    "https://api.deepgram.com/v1/speak".to_string()
}
fn default_synthesis_model() -> String {
    "aura-asteria-en".to_string()
}
fn default_sample_rate() -> u32 {
    16_000
}

impl SynthesisConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: default_synthesis_url(),
            api_key: None,
            model: default_synthesis_model(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Streaming transcription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// Live transcription WebSocket URL
    #[serde(default = "default_stt_url")]
    pub ws_url: String,

    /// API key; absent selects the inert stub
    #[serde(default)]
    pub api_key: Option<String>,

    /// Transcription model identifier
    #[serde(default = "default_stt_model")]
    pub model: String,

    /// Input sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Request interim (partial) results
    #[serde(default = "default_true")]
    pub interim_results: bool,
}

fn default_stt_url() -> String {
    "wss://api.deepgram.com/v1/listen".to_string()
}
fn default_stt_model() -> String {
    "nova-2".to_string()
}

impl SttConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            ws_url: default_stt_url(),
            api_key: None,
            model: default_stt_model(),
            sample_rate: default_sample_rate(),
            interim_results: default_true(),
        }
    }
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search endpoint URL
    #[serde(default = "default_search_url")]
    pub base_url: String,

    /// API key; absent selects the canned-result stand-in
    #[serde(default)]
    pub api_key: Option<String>,

    /// Results folded into the prompt
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_url() -> String {
    "https://api.tavily.com/search".to_string()
}
fn default_max_results() -> usize {
    5
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
            api_key: None,
            max_results: default_max_results(),
        }
    }
}

/// Text embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Embeddings endpoint base URL
    #[serde(default = "default_embeddings_url")]
    pub base_url: String,

    /// API key; absent selects the deterministic hash embedding
    #[serde(default)]
    pub api_key: Option<String>,

    /// Embedding model identifier
    #[serde(default = "default_embeddings_model")]
    pub model: String,
}

fn default_embeddings_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embeddings_model() -> String {
    "text-embedding-3-small".to_string()
}

impl EmbeddingsConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: default_embeddings_url(),
            api_key: None,
            model: default_embeddings_model(),
        }
    }
}

/// Semantic response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the cache
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry time-to-live in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Minimum cosine similarity for a hit
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_cache_ttl() -> u64 {
    300
}
fn default_similarity_threshold() -> f32 {
    0.85
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            ttl_secs: default_cache_ttl(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (VOICELOOP prefix, `__` separator)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICELOOP")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
