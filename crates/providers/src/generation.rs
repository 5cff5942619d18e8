//! Streaming text generation with provider fallback
//!
//! Backends speak the OpenAI-compatible `/chat/completions` SSE protocol.
//! The fallback chain is an explicit ordered list of attempts with a uniform
//! outcome per attempt; its terminal entry is a deterministic mock, so the
//! chain always produces some token stream and never surfaces a fatal error.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use voiceloop_config::ChatEndpoint;

use crate::ProviderError;

/// Prompt handed to a generation backend.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// System preamble
    pub system: String,
    /// User content, possibly enriched with search grounding
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Generation backend trait
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Capability probe
    fn is_configured(&self) -> bool;

    /// Stream generated tokens into `tx` until completion.
    ///
    /// A closed receiver is not an error: the caller has stopped listening
    /// (barge-in) and the backend should just stop.
    async fn stream(&self, prompt: &Prompt, tx: mpsc::Sender<String>) -> Result<(), ProviderError>;

    /// Best-effort warm call. Default is a no-op.
    async fn prewarm(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// OpenAI-compatible streaming chat completion client.
pub struct ChatCompletionGenerator {
    endpoint: ChatEndpoint,
    client: reqwest::Client,
    label: String,
}

impl ChatCompletionGenerator {
    pub fn new(label: impl Into<String>, endpoint: ChatEndpoint, client: reqwest::Client) -> Self {
        Self {
            endpoint,
            client,
            label: label.into(),
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.endpoint.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl GenerationBackend for ChatCompletionGenerator {
    fn name(&self) -> &str {
        &self.label
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }

    async fn stream(&self, prompt: &Prompt, tx: mpsc::Sender<String>) -> Result<(), ProviderError> {
        let api_key = self
            .endpoint
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let body = json!({
            "model": self.endpoint.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "stream": true,
        });

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut events = response.bytes_stream().eventsource();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| ProviderError::Stream(e.to_string()))?;

            if event.data == "[DONE]" {
                break;
            }

            let chunk: serde_json::Value = serde_json::from_str(&event.data)
                .map_err(|e| ProviderError::Stream(format!("bad SSE chunk: {e}")))?;

            if let Some(token) = chunk
                .pointer("/choices/0/delta/content")
                .and_then(|t| t.as_str())
            {
                if !token.is_empty() && tx.send(token.to_string()).await.is_err() {
                    // Receiver gone: the turn was interrupted
                    break;
                }
            }
        }

        Ok(())
    }

    async fn prewarm(&self) -> Result<(), ProviderError> {
        let api_key = self
            .endpoint
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let body = json!({
            "model": self.endpoint.model,
            "messages": [{ "role": "user", "content": "hi" }],
            "max_tokens": 1,
            "stream": false,
        });

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: "prewarm rejected".to_string(),
            });
        }

        Ok(())
    }
}

/// Deterministic generation stand-in.
///
/// Used both as the capability-absent substitute and as the terminal entry
/// of every fallback chain.
pub struct MockGenerator {
    tokens: Vec<&'static str>,
    token_delay: Duration,
}

impl MockGenerator {
    /// Canned answer used when no real provider is configured.
    pub fn canned() -> Self {
        Self {
            tokens: vec![
                "Hello from the mock voice assistant.",
                " I can answer your question.",
            ],
            token_delay: Duration::from_millis(50),
        }
    }

    /// Diagnostic sequence emitted when every real provider failed.
    pub fn diagnostic() -> Self {
        Self {
            tokens: vec![
                "(mock) I can't reach the language model right now.",
                " Please check provider keys.",
            ],
            token_delay: Duration::from_millis(50),
        }
    }
}

#[async_trait]
impl GenerationBackend for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn stream(&self, _prompt: &Prompt, tx: mpsc::Sender<String>) -> Result<(), ProviderError> {
        for token in &self.tokens {
            tokio::time::sleep(self.token_delay).await;
            if tx.send((*token).to_string()).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Ordered list of generation attempts.
///
/// Each attempt is a uniform `Result`; any failure moves to the next entry.
/// The chain is built so its last entry cannot fail.
pub struct FallbackChain {
    attempts: Vec<Arc<dyn GenerationBackend>>,
}

impl FallbackChain {
    pub fn new(attempts: Vec<Arc<dyn GenerationBackend>>) -> Self {
        debug_assert!(!attempts.is_empty());
        Self { attempts }
    }

    /// Build the standard chain: configured endpoints in order, then the
    /// diagnostic mock. With no endpoint configured the canned mock serves
    /// every turn, keeping control flow identical to a configured setup.
    pub fn standard(real: Vec<Arc<dyn GenerationBackend>>) -> Self {
        let configured: Vec<Arc<dyn GenerationBackend>> =
            real.into_iter().filter(|b| b.is_configured()).collect();

        let terminal: Arc<dyn GenerationBackend> = if configured.is_empty() {
            Arc::new(MockGenerator::canned())
        } else {
            Arc::new(MockGenerator::diagnostic())
        };

        let mut attempts = configured;
        attempts.push(terminal);
        Self { attempts }
    }

    /// Stream tokens for `prompt` into `tx`, falling through failed attempts.
    ///
    /// Returns the name of the backend that completed. Never returns an
    /// error: the terminal mock always succeeds.
    pub async fn stream(&self, prompt: &Prompt, tx: mpsc::Sender<String>) -> &str {
        let last = self.attempts.len() - 1;

        for (i, backend) in self.attempts.iter().enumerate() {
            match backend.stream(prompt, tx.clone()).await {
                Ok(()) => return backend.name(),
                Err(e) if i < last => {
                    tracing::warn!(
                        backend = backend.name(),
                        error = %e,
                        "Generation attempt failed, falling back"
                    );
                }
                Err(e) => {
                    // Only reachable if the chain was built without a mock terminal
                    tracing::error!(
                        backend = backend.name(),
                        error = %e,
                        "Final generation attempt failed"
                    );
                }
            }
        }

        "none"
    }

    /// Backends in attempt order, for prewarm.
    pub fn backends(&self) -> &[Arc<dyn GenerationBackend>] {
        &self.attempts
    }
}
