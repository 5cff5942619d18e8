//! Provider gateway for the voiceloop conversation server
//!
//! Abstracts every external collaborator behind a narrow capability
//! interface: text generation, speech synthesis, streaming transcription,
//! web search, and embeddings. Each collaborator carries a capability probe;
//! when credentials are absent the gateway substitutes a deterministic
//! stand-in, so the orchestrator's control flow is identical with or without
//! live providers.

pub mod cache;
pub mod embeddings;
pub mod gateway;
pub mod generation;
pub mod search;
pub mod stt;
pub mod synthesis;

pub use cache::SemanticCache;
pub use embeddings::{Embedder, HashEmbedder, HttpEmbedder};
pub use gateway::ProviderGateway;
pub use generation::{
    ChatCompletionGenerator, FallbackChain, GenerationBackend, MockGenerator, Prompt,
};
pub use search::{MockSearch, SearchBackend, SearchResult, TavilySearch};
pub use stt::{RemoteSttStream, SttHandle, SttStream, StubSttStream, TranscriptEvent};
pub use synthesis::{HttpSynthesizer, SpeechBackend, ToneSynthesizer};

use thiserror::Error;

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Provider not configured")]
    NotConfigured,

    #[error("Channel closed")]
    ChannelClosed,
}
