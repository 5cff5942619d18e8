//! Response pipeline
//!
//! Turns a finalized utterance into a streamed answer: search-grounded
//! prompt, token stream, then synthesized audio. Each stage is fault
//! isolated and the pipeline always closes the turn, so a session can never
//! be left stuck in `Thinking` or `Speaking`.

use std::sync::Arc;
use tokio::sync::mpsc;

use voiceloop_core::{unix_ms, ServerEvent, SessionState};
use voiceloop_providers::{Prompt, ProviderGateway};

use crate::prompt::{build_user_content, fold_results, needs_search};
use crate::session::{Session, TurnHandoff};

/// Spoken when a turn ends with no usable transcript.
const FALLBACK_UTTERANCE: &str = "Sorry, I didn't catch that. Could you say it again?";

const TOKEN_BUFFER: usize = 32;
const AUDIO_BUFFER: usize = 32;

/// Drives one turn from utterance to completed playback.
pub struct ResponsePipeline {
    gateway: Arc<ProviderGateway>,
    system_preamble: String,
}

impl ResponsePipeline {
    pub fn new(gateway: Arc<ProviderGateway>, system_preamble: impl Into<String>) -> Self {
        Self {
            gateway,
            system_preamble: system_preamble.into(),
        }
    }

    /// Run one turn. Spawned per accepted `user_stopped` so the connection's
    /// frame loop keeps observing control messages (notably `barge_in`).
    ///
    /// A handoff without an utterance means no transcript was available at
    /// turn end; the client still gets a complete token/done sequence.
    pub async fn run(&self, session: &Session, handoff: TurnHandoff) {
        let generation = handoff.generation;

        let reply = match handoff.utterance {
            Some(text) => self.answer(session, &text, generation).await,
            None => self.fallback(session, generation).await,
        };

        if let Some(text) = reply {
            self.speak(session, &text, generation).await;
        }

        session.finish_turn(generation).await;
    }

    /// Fixed single-token reply for transcript-less turns.
    async fn fallback(&self, session: &Session, generation: u64) -> Option<String> {
        if generation != session.current_generation() {
            return None;
        }
        if !session.transition_to(SessionState::Speaking).await {
            return None;
        }

        session.mark_generation_started();
        session.emit(ServerEvent::LlmStarted { ts: unix_ms() }).await;

        session.mark_first_token();
        session
            .emit(ServerEvent::LlmToken {
                text: FALLBACK_UTTERANCE.to_string(),
                index: 0,
                ts: unix_ms(),
            })
            .await;

        session.mark_generation_done();
        session.emit(ServerEvent::LlmDone { ts: unix_ms() }).await;

        Some(FALLBACK_UTTERANCE.to_string())
    }

    /// Grounding, cache probe, then streamed generation.
    async fn answer(&self, session: &Session, utterance: &str, generation: u64) -> Option<String> {
        if generation != session.current_generation() {
            return None;
        }

        let grounding = if needs_search(utterance) {
            match self.gateway.search(utterance).await {
                Ok(results) if !results.is_empty() => Some(fold_results(&results)),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(
                        session = %session.id(),
                        error = %e,
                        "Search failed, answering ungrounded"
                    );
                    None
                }
            }
        } else {
            None
        };

        let mut cache_key = None;
        if let Some(cache) = self.gateway.cache() {
            match self.gateway.embed(utterance).await {
                Ok(embedding) => {
                    if let Some(hit) = cache.lookup(&embedding) {
                        tracing::debug!(session = %session.id(), "Semantic cache hit");
                        return self.replay_cached(session, hit, generation).await;
                    }
                    cache_key = Some(embedding);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Embedding failed, skipping cache");
                }
            }
        }

        // Search and cache probing take time; re-check before going loud
        if generation != session.current_generation() {
            return None;
        }

        // The client sees "responding" before the first token exists
        if !session.transition_to(SessionState::Speaking).await {
            return None;
        }

        session.mark_generation_started();
        session.emit(ServerEvent::LlmStarted { ts: unix_ms() }).await;

        let prompt = Prompt::new(
            &self.system_preamble,
            build_user_content(utterance, grounding.as_deref()),
        );

        let (tokens_tx, mut tokens_rx) = mpsc::channel(TOKEN_BUFFER);
        let gateway = Arc::clone(&self.gateway);
        let generator = tokio::spawn(async move {
            let served = gateway.generate(&prompt, tokens_tx).await.to_string();
            tracing::debug!(backend = %served, "Generation stream closed");
        });

        let mut full = String::new();
        let mut index = 0u32;
        while let Some(token) = tokens_rx.recv().await {
            if session.current_generation() != generation {
                break;
            }

            session.mark_first_token();
            session
                .emit(ServerEvent::LlmToken {
                    text: token.clone(),
                    index,
                    ts: unix_ms(),
                })
                .await;
            index += 1;
            full.push_str(&token);
        }
        drop(tokens_rx);
        let _ = generator.await;

        if session.current_generation() != generation {
            return None;
        }

        session.mark_generation_done();
        session.emit(ServerEvent::LlmDone { ts: unix_ms() }).await;

        if let (Some(cache), Some(embedding)) = (self.gateway.cache(), cache_key) {
            if !full.is_empty() {
                cache.store(embedding, full.clone());
            }
        }

        (!full.is_empty()).then_some(full)
    }

    /// Stream a cached reply as a single token.
    async fn replay_cached(
        &self,
        session: &Session,
        text: String,
        generation: u64,
    ) -> Option<String> {
        if generation != session.current_generation() {
            return None;
        }
        if !session.transition_to(SessionState::Speaking).await {
            return None;
        }

        session.mark_generation_started();
        session.emit(ServerEvent::LlmStarted { ts: unix_ms() }).await;

        session.mark_first_token();
        session
            .emit(ServerEvent::LlmToken {
                text: text.clone(),
                index: 0,
                ts: unix_ms(),
            })
            .await;

        session.mark_generation_done();
        session.emit(ServerEvent::LlmDone { ts: unix_ms() }).await;

        Some(text)
    }

    /// Stream synthesized audio for the accumulated reply. Failures are
    /// swallowed: the turn completes text-only.
    async fn speak(&self, session: &Session, text: &str, generation: u64) {
        if session.current_generation() != generation {
            return;
        }

        let (audio_tx, mut audio_rx) = mpsc::channel(AUDIO_BUFFER);
        let gateway = Arc::clone(&self.gateway);
        let owned = text.to_string();
        let synthesizer = tokio::spawn(async move { gateway.synthesize(&owned, audio_tx).await });

        while let Some(chunk) = audio_rx.recv().await {
            if session.current_generation() != generation {
                break;
            }
            session.emit_audio(chunk, generation).await;
        }
        drop(audio_rx);

        match synthesizer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    session = %session.id(),
                    error = %e,
                    "Synthesis failed, turn completes text-only"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Synthesis task panicked");
            }
        }
    }
}
