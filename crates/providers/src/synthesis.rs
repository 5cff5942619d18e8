//! Streaming speech synthesis
//!
//! The remote backend streams raw PCM over HTTP. The stand-in generates a
//! short 440 Hz tone so playback paths stay exercisable without credentials.
//! Synthesis failures are the caller's to swallow: a turn degrades to
//! text-only, it never aborts.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

use voiceloop_config::SynthesisConfig;

use crate::ProviderError;

/// Speech synthesis backend trait
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Capability probe
    fn is_configured(&self) -> bool;

    /// Stream synthesized PCM chunks for `text` into `tx`.
    async fn stream(&self, text: &str, tx: mpsc::Sender<Vec<u8>>) -> Result<(), ProviderError>;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;
}

/// Remote HTTP synthesis client (Deepgram-style `/speak` endpoint).
pub struct HttpSynthesizer {
    config: SynthesisConfig,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    pub fn new(config: SynthesisConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl SpeechBackend for HttpSynthesizer {
    fn name(&self) -> &str {
        "http"
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn stream(&self, text: &str, tx: mpsc::Sender<Vec<u8>>) -> Result<(), ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let sample_rate = self.config.sample_rate.to_string();
        let response = self
            .client
            .post(&self.config.base_url)
            .query(&[
                ("model", self.config.model.as_str()),
                ("encoding", "linear16"),
                ("sample_rate", sample_rate.as_str()),
            ])
            .header("Authorization", format!("Token {api_key}"))
            .json(&json!({ "text": text }))
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

        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;
            if !chunk.is_empty() && tx.send(chunk.to_vec()).await.is_err() {
                break;
            }
        }

        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

/// Tone-generator stand-in: ~900 ms of 440 Hz sine PCM in paced chunks.
pub struct ToneSynthesizer {
    sample_rate: u32,
    duration_ms: u32,
    chunk_bytes: usize,
    chunk_delay: Duration,
}

impl ToneSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            duration_ms: 900,
            chunk_bytes: 32_000,
            chunk_delay: Duration::from_millis(120),
        }
    }
}

/// 16-bit mono sine PCM at 440 Hz, 0.2 amplitude.
pub fn sine_pcm(duration_ms: u32, sample_rate: u32) -> Vec<u8> {
    let samples = (u64::from(duration_ms) * u64::from(sample_rate) / 1000) as usize;
    let mut pcm = Vec::with_capacity(samples * 2);
    let freq = 440.0_f32;

    for i in 0..samples {
        let t = i as f32 / sample_rate as f32;
        let amp = ((2.0 * std::f32::consts::PI * freq * t).sin() * 0.2 * 32767.0) as i16;
        pcm.extend_from_slice(&amp.to_le_bytes());
    }

    pcm
}

#[async_trait]
impl SpeechBackend for ToneSynthesizer {
    fn name(&self) -> &str {
        "tone"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn stream(&self, _text: &str, tx: mpsc::Sender<Vec<u8>>) -> Result<(), ProviderError> {
        let pcm = sine_pcm(self.duration_ms, self.sample_rate);

        for chunk in pcm.chunks(self.chunk_bytes) {
            if tx.send(chunk.to_vec()).await.is_err() {
                break;
            }
            tokio::time::sleep(self.chunk_delay).await;
        }

        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
