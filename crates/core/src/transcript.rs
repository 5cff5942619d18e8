//! Transcript buffering
//!
//! Holds the latest partial and the most recent final transcription text for
//! one session. The final text is authoritative once set and is cleared at
//! the start and end of every turn.

/// Partial/final transcript state for a session.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    partial: Option<String>,
    finalized: Option<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interim transcription.
    pub fn set_partial(&mut self, text: impl Into<String>) {
        self.partial = Some(text.into());
    }

    /// Record a finalized transcription. Authoritative until the turn resets.
    pub fn set_final(&mut self, text: impl Into<String>) {
        self.finalized = Some(text.into());
    }

    /// Latest interim text.
    pub fn partial(&self) -> Option<&str> {
        self.partial.as_deref()
    }

    /// Finalized text, if transcription has completed for this turn.
    pub fn finalized(&self) -> Option<&str> {
        self.finalized.as_deref()
    }

    /// Take the finalized text, leaving the buffer without one.
    ///
    /// Whitespace-only finals count as absent: a turn with no usable speech
    /// goes down the fallback path.
    pub fn take_final(&mut self) -> Option<String> {
        match self.finalized.take() {
            Some(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }

    /// True if a non-empty final transcript is available.
    pub fn has_final(&self) -> bool {
        self.finalized
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }

    /// Discard both partial and final text (turn reset, barge-in).
    pub fn clear(&mut self) {
        self.partial = None;
        self.finalized = None;
    }
}
