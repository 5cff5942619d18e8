//! Text embeddings for the semantic response cache
//!
//! The remote backend calls an OpenAI-compatible `/embeddings` endpoint.
//! The stand-in produces a deterministic 8-dimensional vector from character
//! codes, normalized, so cache behavior is reproducible offline.

use async_trait::async_trait;
use serde_json::json;

use voiceloop_config::EmbeddingsConfig;

use crate::ProviderError;

/// Embedding backend trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Capability probe
    fn is_configured(&self) -> bool;

    /// Embed `text` into a dense vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Remote embeddings client.
pub struct HttpEmbedder {
    config: EmbeddingsConfig,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingsConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let url = format!(
            "{}/embeddings",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&json!({ "model": self.config.model, "input": text }))
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

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Stream(e.to_string()))?;

        let embedding = value
            .pointer("/data/0/embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ProviderError::Stream("missing embedding in response".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        Ok(embedding)
    }
}

/// Deterministic hash embedding, 8 dimensions, unit norm.
#[derive(Debug, Default)]
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn is_configured(&self) -> bool {
        false
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut out = [0.0f32; 8];
        for (i, ch) in text.chars().enumerate() {
            out[i % out.len()] += (ch as u32 % 97) as f32;
        }

        let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt().max(1.0);
        Ok(out.iter().map(|v| v / norm).collect())
    }
}
