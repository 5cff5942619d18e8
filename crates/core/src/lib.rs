//! Core types for the voiceloop conversation server
//!
//! This crate provides foundational types used across all other crates:
//! - Session state enum with a validated transition table
//! - Turn tracking (duplicate end-of-turn suppression)
//! - Transcript buffering
//! - Wire protocol events
//! - Per-turn latency metrics

pub mod events;
pub mod metrics;
pub mod state;
pub mod transcript;
pub mod turn;

pub use events::{unix_ms, ClientEvent, Outbound, ServerEvent};
pub use metrics::TurnMetrics;
pub use state::SessionState;
pub use transcript::TranscriptBuffer;
pub use turn::{TurnOutcome, TurnTracker};
