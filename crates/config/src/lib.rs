//! Configuration for the voiceloop conversation server
//!
//! Settings are layered: `config/default.yaml`, an optional
//! environment-specific file, then `VOICELOOP__`-prefixed environment
//! variables (double underscore as the section separator). Provider API keys
//! normally arrive through the environment; a missing key downgrades that
//! provider to its deterministic stand-in rather than failing startup.

mod settings;

pub use settings::{
    load_settings, CacheConfig, ChatEndpoint, ConfigError, EmbeddingsConfig, GenerationConfig,
    ObservabilityConfig, ProviderConfig, SearchConfig, ServerConfig, Settings, SttConfig,
    SynthesisConfig,
};
