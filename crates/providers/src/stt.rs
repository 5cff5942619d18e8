//! Streaming speech-to-text collaborator
//!
//! The live backend holds a WebSocket to the transcription service: audio
//! bytes go up, `{text, is_final}` events come back. When unconfigured, an
//! inert stub takes its place: audio is accepted and discarded, no events
//! are produced, and the session completes turns through the fallback path.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use voiceloop_config::SttConfig;

use crate::ProviderError;

/// One transcription event from the collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

/// Streaming transcription connection
#[async_trait]
pub trait SttStream: Send {
    /// True when audio is actually forwarded upstream
    fn is_active(&self) -> bool;

    /// Forward raw PCM bytes
    async fn send(&mut self, pcm: &[u8]) -> Result<(), ProviderError>;

    /// Close the upstream stream
    async fn finish(&mut self) -> Result<(), ProviderError>;
}

/// Owning wrapper around a transcription stream.
///
/// `finish` is idempotent: the first call releases the upstream connection,
/// later calls are no-ops. Connection teardown paths may race (client close
/// vs. liveness kill), so the release-once guarantee lives here.
pub struct SttHandle {
    inner: Box<dyn SttStream>,
    finished: bool,
}

impl SttHandle {
    pub fn new(inner: Box<dyn SttStream>) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.finished && self.inner.is_active()
    }

    /// Forward audio; dropped silently once finished.
    pub async fn send(&mut self, pcm: &[u8]) -> Result<(), ProviderError> {
        if self.finished {
            return Ok(());
        }
        self.inner.send(pcm).await
    }

    pub async fn finish(&mut self) -> Result<(), ProviderError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.inner.finish().await
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Live transcription over WebSocket (Deepgram-style protocol).
pub struct RemoteSttStream {
    sink: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    reader: JoinHandle<()>,
}

impl RemoteSttStream {
    /// Connect and start forwarding transcription events into `events`.
    pub async fn connect(
        config: &SttConfig,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let url = format!(
            "{}?model={}&encoding=linear16&sample_rate={}&interim_results={}",
            config.ws_url, config.model, config.sample_rate, config.interim_results,
        );

        let mut request = url
            .into_client_request()
            .map_err(|e| ProviderError::WebSocket(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {api_key}"))
                .map_err(|e| ProviderError::WebSocket(e.to_string()))?,
        );

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| ProviderError::WebSocket(e.to_string()))?;

        let (sink, mut source) = ws.split();

        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = parse_transcription(&text) {
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Transcription socket error");
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self { sink, reader })
    }
}

/// Extract `{text, is_final}` from a live transcription result frame.
fn parse_transcription(raw: &str) -> Option<TranscriptEvent> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;

    let text = value
        .pointer("/channel/alternatives/0/transcript")?
        .as_str()?;
    if text.is_empty() {
        return None;
    }

    Some(TranscriptEvent {
        text: text.to_string(),
        is_final: value["is_final"].as_bool().unwrap_or(false),
    })
}

#[async_trait]
impl SttStream for RemoteSttStream {
    fn is_active(&self) -> bool {
        true
    }

    async fn send(&mut self, pcm: &[u8]) -> Result<(), ProviderError> {
        self.sink
            .send(Message::Binary(pcm.to_vec()))
            .await
            .map_err(|e| ProviderError::WebSocket(e.to_string()))
    }

    async fn finish(&mut self) -> Result<(), ProviderError> {
        // Ask the service to flush its final result, then close our side
        let _ = self
            .sink
            .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()))
            .await;
        let _ = self.sink.close().await;
        Ok(())
    }
}

impl Drop for RemoteSttStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Capability-absent stand-in: accepts and discards audio, emits nothing.
#[derive(Debug, Default)]
pub struct StubSttStream;

#[async_trait]
impl SttStream for StubSttStream {
    fn is_active(&self) -> bool {
        false
    }

    async fn send(&mut self, _pcm: &[u8]) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }
}
