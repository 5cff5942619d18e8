//! Wire protocol events
//!
//! Textual control frames are JSON, tagged by `type`. Audio travels as raw
//! binary WebSocket frames (16 kHz mono 16-bit little-endian PCM) and never
//! appears in these enums.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::state::SessionState;

/// Control messages sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Marks the beginning of a candidate turn
    TurnStart { id: String },
    /// End of utterance, triggers the response pipeline
    UserStopped { id: String },
    /// Interrupts playback/generation, returns to listening
    BargeIn,
}

/// Events sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Assigned session identifier
    SessionId { id: String },
    /// Current session state
    State { value: SessionState },
    /// Interim transcription
    TranscriptPartial { text: String },
    /// Finalized transcription
    TranscriptFinal { text: String },
    /// Generation began
    LlmStarted { ts: u64 },
    /// One generated token
    LlmToken { text: String, index: u32, ts: u64 },
    /// Generation complete
    LlmDone { ts: u64 },
}

/// Frame queued for delivery to one client.
///
/// Audio carries the barge-in generation it belongs to; the writer drops
/// chunks whose generation is no longer current, so interrupted playback
/// never reaches the speaker.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(ServerEvent),
    Audio { pcm: Vec<u8>, generation: u64 },
    /// Liveness probe from the heartbeat sweep
    Ping,
}

/// Milliseconds since the unix epoch, for event timestamps.
pub fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
