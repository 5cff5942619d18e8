//! Per-connection session
//!
//! Owns one conversation's state machine, transcript buffer, turn tracker,
//! and metrics. Mutable fields are touched only by the connection's handling
//! task and the spawned response pipeline; the heartbeat sweep reads the
//! liveness flag. Barge-in cancellation is a generation counter: every
//! outbound token/audio send re-checks it, so a superseded turn's output is
//! suppressed even when the upstream call cannot be aborted.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;

use voiceloop_core::{
    Outbound, ServerEvent, SessionState, TranscriptBuffer, TurnMetrics, TurnOutcome, TurnTracker,
};
use voiceloop_providers::TranscriptEvent;

/// Everything the response pipeline needs from an accepted `user_stopped`.
///
/// The generation is snapshotted synchronously in the frame loop, before any
/// later `barge_in` can be processed; a pipeline task scheduled late still
/// sees the generation its turn belonged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnHandoff {
    /// Finalized utterance, or `None` for the fallback path
    pub utterance: Option<String>,
    /// Barge-in generation this turn belongs to
    pub generation: u64,
}

/// One conversation session.
pub struct Session {
    id: String,
    state: Mutex<SessionState>,
    transcript: Mutex<TranscriptBuffer>,
    turns: Mutex<TurnTracker>,
    metrics: Mutex<TurnMetrics>,
    /// Barge-in generation; bumping it orphans all in-flight output
    generation: AtomicU64,
    /// Refreshed by inbound frames, cleared by the heartbeat sweep
    alive: AtomicBool,
    outbound: mpsc::Sender<Outbound>,
}

impl Session {
    pub fn new(id: impl Into<String>, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(SessionState::Listening),
            transcript: Mutex::new(TranscriptBuffer::new()),
            turns: Mutex::new(TurnTracker::new()),
            metrics: Mutex::new(TurnMetrics::new()),
            generation: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            outbound,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Attempt a state transition, emitting the `state` event on success.
    ///
    /// An illegal edge is a protocol-level no-op: logged, state unchanged.
    pub async fn transition_to(&self, next: SessionState) -> bool {
        {
            let mut state = self.state.lock();
            if !state.can_transition_to(next) {
                tracing::warn!(
                    session = %self.id,
                    from = %state,
                    to = %next,
                    "Rejected illegal state transition"
                );
                return false;
            }
            *state = next;
        }

        self.emit(ServerEvent::State { value: next }).await;
        true
    }

    /// Queue an event for the client. A closed channel means the connection
    /// is going away; the event is dropped.
    pub async fn emit(&self, event: ServerEvent) {
        if self.outbound.send(Outbound::Event(event)).await.is_err() {
            tracing::debug!(session = %self.id, "Outbound channel closed, event dropped");
        }
    }

    /// Queue synthesized audio tagged with its turn generation. Stale chunks
    /// (barged-in turns) are dropped here and again at write time.
    pub async fn emit_audio(&self, pcm: Vec<u8>, generation: u64) {
        if generation != self.current_generation() {
            return;
        }
        let _ = self
            .outbound
            .send(Outbound::Audio { pcm, generation })
            .await;
    }

    /// Current barge-in generation.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    // --- control messages ---------------------------------------------------

    /// `turn_start`: record the candidate turn id. No state change.
    pub fn on_turn_start(&self, turn_id: &str) {
        self.turns.lock().start_turn(turn_id);
        tracing::debug!(session = %self.id, turn = turn_id, "Turn started");
    }

    /// `user_stopped`: dedupe via the turn tracker, then move to `Thinking`.
    ///
    /// Returns the handoff for the response pipeline, or `None` when the
    /// signal is a duplicate or arrives in a state where a turn cannot end.
    pub async fn on_user_stopped(&self, turn_id: &str) -> Option<TurnHandoff> {
        if self.turns.lock().end_turn(turn_id) == TurnOutcome::Duplicate {
            tracing::debug!(session = %self.id, turn = turn_id, "Duplicate user_stopped ignored");
            return None;
        }

        if !self.transition_to(SessionState::Thinking).await {
            return None;
        }

        {
            let mut metrics = self.metrics.lock();
            metrics.clear();
            metrics.mark_turn_ended();
        }

        Some(TurnHandoff {
            utterance: self.transcript.lock().take_final(),
            generation: self.current_generation(),
        })
    }

    /// `barge_in`: always legal. Orphans in-flight output, clears transcript
    /// state and queued audio, returns to `Listening`.
    pub async fn on_barge_in(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.transcript.lock().clear();

        let changed = {
            let mut state = self.state.lock();
            let changed = *state != SessionState::Listening;
            *state = SessionState::Listening;
            changed
        };

        tracing::info!(session = %self.id, "Barge-in, back to listening");
        if changed {
            self.emit(ServerEvent::State {
                value: SessionState::Listening,
            })
            .await;
        }
    }

    // --- transcription ------------------------------------------------------

    /// Feed one transcription event into the buffer and mirror it out.
    pub async fn on_transcript_event(&self, event: TranscriptEvent) {
        if event.is_final {
            self.transcript.lock().set_final(event.text.clone());
            self.metrics.lock().mark_transcript_final();
            self.emit(ServerEvent::TranscriptFinal { text: event.text })
                .await;
        } else {
            self.transcript.lock().set_partial(event.text.clone());
            self.emit(ServerEvent::TranscriptPartial { text: event.text })
                .await;
        }
    }

    /// True when a finalized transcript is waiting for the next turn end.
    pub fn has_final_transcript(&self) -> bool {
        self.transcript.lock().has_final()
    }

    // --- turn lifecycle -----------------------------------------------------

    /// Metrics hooks for the response pipeline.
    pub fn mark_generation_started(&self) {
        self.metrics.lock().mark_generation_started();
    }

    pub fn mark_first_token(&self) {
        self.metrics.lock().mark_first_token();
    }

    pub fn mark_generation_done(&self) {
        self.metrics.lock().mark_generation_done();
    }

    /// Close out a turn: clear transcripts, log latency marks, return to
    /// `Listening`. Skipped entirely when the turn was barged in: the
    /// barge-in already reset the session and a stale pipeline must not
    /// touch the new turn's state.
    pub async fn finish_turn(&self, generation: u64) {
        if generation != self.current_generation() {
            tracing::debug!(session = %self.id, "Superseded turn finished, no reset");
            return;
        }

        self.transcript.lock().clear();

        {
            let metrics = self.metrics.lock();
            tracing::info!(
                session = %self.id,
                first_token_ms = metrics.time_to_first_token().map(|d| d.as_millis() as u64),
                generation_ms = metrics.generation_duration().map(|d| d.as_millis() as u64),
                "Turn complete"
            );
        }

        self.transition_to(SessionState::Listening).await;
    }

    // --- liveness -----------------------------------------------------------

    /// Queue a liveness probe for the client.
    pub async fn send_ping(&self) {
        let _ = self.outbound.send(Outbound::Ping).await;
    }

    /// Any inbound traffic refreshes liveness.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Heartbeat sweep: read and clear the flag. Returns the value before
    /// clearing; a `false` means nothing arrived since the previous sweep.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> (Session, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(64);
        (Session::new("s1", tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn starts_listening() {
        let (session, _rx) = make_session();
        assert_eq!(session.state(), SessionState::Listening);
    }

    #[tokio::test]
    async fn user_stopped_moves_to_thinking() {
        let (session, mut rx) = make_session();
        session.on_turn_start("t1");

        let handoff = session.on_user_stopped("t1").await.unwrap();
        assert_eq!(handoff.utterance, None); // no transcript yet -> fallback path
        assert_eq!(session.state(), SessionState::Thinking);

        let events = drain(&mut rx);
        assert!(matches!(
            events[0],
            Outbound::Event(ServerEvent::State {
                value: SessionState::Thinking
            })
        ));
    }

    #[tokio::test]
    async fn duplicate_user_stopped_is_a_noop() {
        let (session, mut rx) = make_session();
        session.on_turn_start("t1");

        assert!(session.on_user_stopped("t1").await.is_some());
        drain(&mut rx);

        assert!(session.on_user_stopped("t1").await.is_none());
        assert!(drain(&mut rx).is_empty()); // no second THINKING transition
    }

    #[tokio::test]
    async fn user_stopped_hands_over_final_transcript() {
        let (session, _rx) = make_session();
        session
            .on_transcript_event(TranscriptEvent {
                text: "what's the weather".to_string(),
                is_final: true,
            })
            .await;

        let handoff = session.on_user_stopped("t1").await.unwrap();
        assert_eq!(
            handoff.utterance.as_deref(),
            Some("what's the weather")
        );
        // Final transcript is consumed by the handoff
        assert!(!session.has_final_transcript());
    }

    #[tokio::test]
    async fn barge_in_from_every_state_lands_listening() {
        for prime in [false, true] {
            let (session, _rx) = make_session();
            if prime {
                session.on_user_stopped("t1").await;
                session.transition_to(SessionState::Speaking).await;
            }
            session.on_barge_in().await;
            assert_eq!(session.state(), SessionState::Listening);
        }
    }

    #[tokio::test]
    async fn barge_in_orphans_the_running_generation() {
        let (session, _rx) = make_session();
        let generation = session.current_generation();

        session.on_barge_in().await;
        assert_ne!(session.current_generation(), generation);

        // Stale audio is refused at the emit gate
        session.emit_audio(vec![1, 2, 3], generation).await;
        let (session2, mut rx2) = make_session();
        session2.emit_audio(vec![1, 2, 3], session2.current_generation()).await;
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[tokio::test]
    async fn barge_in_clears_pending_transcripts() {
        let (session, _rx) = make_session();
        session
            .on_transcript_event(TranscriptEvent {
                text: "half a sentence".to_string(),
                is_final: true,
            })
            .await;

        session.on_barge_in().await;
        assert!(!session.has_final_transcript());
    }

    #[tokio::test]
    async fn finish_turn_skips_superseded_generations() {
        let (session, mut rx) = make_session();
        session.on_user_stopped("t1").await;
        session.transition_to(SessionState::Speaking).await;
        let generation = session.current_generation();

        session.on_barge_in().await; // supersedes the turn
        drain(&mut rx);

        session.finish_turn(generation).await;
        // No extra state event: the barge-in already restored Listening
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.state(), SessionState::Listening);
    }

    #[tokio::test]
    async fn handoff_generation_predates_a_late_barge_in() {
        let (session, _rx) = make_session();

        let handoff = session.on_user_stopped("t1").await.unwrap();
        session.on_barge_in().await;

        // The pipeline task may start after the barge; the snapshot keeps
        // the superseded turn identifiable
        assert_ne!(handoff.generation, session.current_generation());
    }

    #[tokio::test]
    async fn liveness_flag_swaps_down() {
        let (session, _rx) = make_session();
        assert!(session.take_alive());
        assert!(!session.take_alive());
        session.mark_alive();
        assert!(session.take_alive());
    }
}
