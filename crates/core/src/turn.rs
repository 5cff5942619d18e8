//! Turn tracking
//!
//! Clients may retransmit control messages; a `user_stopped` that repeats the
//! last handled turn id must not trigger a second generation cycle.

/// Outcome of observing an end-of-turn signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// First delivery for this turn, commit and proceed
    Accept,
    /// Re-delivery of an already handled turn, caller must no-op
    Duplicate,
}

/// Records the active turn id and suppresses duplicate completions.
#[derive(Debug, Default)]
pub struct TurnTracker {
    current: Option<String>,
    last_handled: Option<String>,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the id of a candidate turn. Ids are opaque client strings.
    pub fn start_turn(&mut self, id: impl Into<String>) {
        self.current = Some(id.into());
    }

    /// Observe an end-of-turn signal.
    ///
    /// Returns `Duplicate` when `observed` equals the most recently completed
    /// turn (no state change), otherwise commits it as handled.
    pub fn end_turn(&mut self, observed: &str) -> TurnOutcome {
        if self.last_handled.as_deref() == Some(observed) {
            return TurnOutcome::Duplicate;
        }

        self.last_handled = Some(observed.to_string());
        self.current = None;
        TurnOutcome::Accept
    }

    /// Id recorded by the last `turn_start`, if a turn is open.
    pub fn current_turn(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Id of the most recently completed turn.
    pub fn last_handled(&self) -> Option<&str> {
        self.last_handled.as_deref()
    }
}
