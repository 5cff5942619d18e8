//! Provider gateway
//!
//! Assembles every collaborator from settings, applying the capability probe
//! once at construction: unconfigured providers are replaced by their
//! deterministic stand-ins, so callers never branch on configuration.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use voiceloop_config::Settings;

use crate::cache::SemanticCache;
use crate::embeddings::{Embedder, HashEmbedder, HttpEmbedder};
use crate::generation::{ChatCompletionGenerator, FallbackChain, GenerationBackend, Prompt};
use crate::search::{MockSearch, SearchBackend, SearchResult, TavilySearch};
use crate::stt::{RemoteSttStream, SttHandle, StubSttStream, TranscriptEvent};
use crate::synthesis::{HttpSynthesizer, SpeechBackend, ToneSynthesizer};
use crate::ProviderError;

/// Buffered transcription events per session.
const STT_EVENT_BUFFER: usize = 64;

/// One gateway per process, shared by all sessions.
pub struct ProviderGateway {
    generation: FallbackChain,
    synthesis: Arc<dyn SpeechBackend>,
    search: Arc<dyn SearchBackend>,
    embedder: Arc<dyn Embedder>,
    cache: Option<Arc<SemanticCache>>,
    stt: voiceloop_config::SttConfig,
    prewarm_enabled: bool,
    prewarm_timeout: Duration,
}

impl ProviderGateway {
    pub fn from_settings(settings: &Settings) -> Self {
        let client = reqwest::Client::new();
        let providers = &settings.providers;

        let real: Vec<Arc<dyn GenerationBackend>> = vec![
            Arc::new(ChatCompletionGenerator::new(
                "primary",
                providers.generation.primary.clone(),
                client.clone(),
            )),
            Arc::new(ChatCompletionGenerator::new(
                "secondary",
                providers.generation.secondary.clone(),
                client.clone(),
            )),
        ];
        let generation = FallbackChain::standard(real);

        let synthesis: Arc<dyn SpeechBackend> = if providers.synthesis.is_configured() {
            Arc::new(HttpSynthesizer::new(
                providers.synthesis.clone(),
                client.clone(),
            ))
        } else {
            Arc::new(ToneSynthesizer::new(providers.synthesis.sample_rate))
        };

        let search: Arc<dyn SearchBackend> = if providers.search.is_configured() {
            Arc::new(TavilySearch::new(providers.search.clone(), client.clone()))
        } else {
            Arc::new(MockSearch)
        };

        let embedder: Arc<dyn Embedder> = if providers.embeddings.is_configured() {
            Arc::new(HttpEmbedder::new(providers.embeddings.clone(), client))
        } else {
            Arc::new(HashEmbedder)
        };

        let cache = settings.cache.enabled.then(|| {
            Arc::new(SemanticCache::new(
                Duration::from_secs(settings.cache.ttl_secs),
                settings.cache.similarity_threshold,
            ))
        });

        Self {
            generation,
            synthesis,
            search,
            embedder,
            cache,
            stt: providers.stt.clone(),
            prewarm_enabled: providers.prewarm_enabled,
            prewarm_timeout: Duration::from_secs(providers.prewarm_timeout_secs),
        }
    }

    /// Stream generated tokens into `tx`. Never fails; returns the name of
    /// the backend that served the turn.
    pub async fn generate(&self, prompt: &Prompt, tx: mpsc::Sender<String>) -> &str {
        self.generation.stream(prompt, tx).await
    }

    /// Stream synthesized PCM chunks into `tx`.
    pub async fn synthesize(
        &self,
        text: &str,
        tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), ProviderError> {
        self.synthesis.stream(text, tx).await
    }

    /// Open a transcription stream for one session.
    ///
    /// Falls back to the inert stub when unconfigured or when the upstream
    /// connection cannot be established; either way the session proceeds.
    pub async fn open_stt(&self) -> (SttHandle, mpsc::Receiver<TranscriptEvent>) {
        let (tx, rx) = mpsc::channel(STT_EVENT_BUFFER);

        if self.stt.is_configured() {
            match RemoteSttStream::connect(&self.stt, tx).await {
                Ok(stream) => return (SttHandle::new(Box::new(stream)), rx),
                Err(e) => {
                    tracing::warn!(error = %e, "Transcription connect failed, using stub");
                }
            }
        }

        (SttHandle::new(Box::new(StubSttStream)), rx)
    }

    /// Ranked web results for `query`.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        self.search.search(query).await
    }

    /// Embed an utterance for cache lookup.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embedder.embed(text).await
    }

    /// Semantic response cache, when enabled.
    pub fn cache(&self) -> Option<&Arc<SemanticCache>> {
        self.cache.as_ref()
    }

    /// Synthesis output sample rate in Hz.
    pub fn synthesis_sample_rate(&self) -> u32 {
        self.synthesis.sample_rate()
    }

    /// Best-effort, time-bounded warm call per generation backend.
    /// Failures are logged and never surfaced.
    pub async fn prewarm(&self) {
        if !self.prewarm_enabled {
            return;
        }

        for backend in self.generation.backends() {
            match timeout(self.prewarm_timeout, backend.prewarm()).await {
                Ok(Ok(())) => {
                    tracing::debug!(backend = backend.name(), "Prewarm completed");
                }
                Ok(Err(e)) => {
                    tracing::warn!(backend = backend.name(), error = %e, "Prewarm failed");
                }
                Err(_) => {
                    tracing::warn!(backend = backend.name(), "Prewarm timed out");
                }
            }
        }
    }
}
