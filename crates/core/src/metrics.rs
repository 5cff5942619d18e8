//! Per-turn latency metrics
//!
//! Timestamps along the turn lifecycle, for observability only. Correctness
//! never depends on these.

use std::time::{Duration, Instant};

/// Timestamps collected over one turn.
#[derive(Debug, Default, Clone)]
pub struct TurnMetrics {
    turn_ended: Option<Instant>,
    transcript_final: Option<Instant>,
    generation_started: Option<Instant>,
    first_token: Option<Instant>,
    generation_done: Option<Instant>,
}

impl TurnMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_turn_ended(&mut self) {
        self.turn_ended = Some(Instant::now());
    }

    pub fn mark_transcript_final(&mut self) {
        self.transcript_final = Some(Instant::now());
    }

    pub fn mark_generation_started(&mut self) {
        self.generation_started = Some(Instant::now());
    }

    /// Records only the first token; later calls are no-ops.
    pub fn mark_first_token(&mut self) {
        if self.first_token.is_none() {
            self.first_token = Some(Instant::now());
        }
    }

    pub fn mark_generation_done(&mut self) {
        self.generation_done = Some(Instant::now());
    }

    /// Turn end to first generated token.
    pub fn time_to_first_token(&self) -> Option<Duration> {
        Some(self.first_token?.duration_since(self.turn_ended?))
    }

    /// Generation start to generation end.
    pub fn generation_duration(&self) -> Option<Duration> {
        Some(self.generation_done?.duration_since(self.generation_started?))
    }

    /// Turn end to transcript finalization.
    pub fn transcription_lag(&self) -> Option<Duration> {
        Some(self.transcript_final?.duration_since(self.turn_ended?))
    }

    /// Reset for the next turn.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
