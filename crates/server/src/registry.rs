//! Session registry
//!
//! The only cross-session structure: a coarse-locked map from session id to
//! its connection entry, used for bookkeeping and the heartbeat sweep, never
//! for per-turn logic. One handling task owns each session; removal happens
//! exactly once, on connection close.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use voiceloop_pipeline::Session;

use crate::ServerError;

/// One live connection.
pub struct ConnectionEntry {
    pub session: Arc<Session>,
    /// Flipped to `true` to force the connection's frame loop to exit
    shutdown: watch::Sender<bool>,
}

/// Registry of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, ConnectionEntry>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session. Returns the shutdown receiver the handling
    /// task must watch.
    pub fn insert(&self, session: Arc<Session>) -> Result<watch::Receiver<bool>, ServerError> {
        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            return Err(ServerError::Capacity);
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        sessions.insert(
            session.id().to_string(),
            ConnectionEntry { session, shutdown },
        );

        Ok(shutdown_rx)
    }

    /// Remove a session. Idempotent: the second remove returns `None` and
    /// changes nothing.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(id);
        if let Some(entry) = &removed {
            tracing::info!(session = %entry.session.id(), "Session removed");
        }
        removed.map(|entry| entry.session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).map(|e| Arc::clone(&e.session))
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// All live session ids.
    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Snapshot of entries for the heartbeat sweep: `(session, terminate)`.
    pub fn snapshot(&self) -> Vec<(Arc<Session>, watch::Sender<bool>)> {
        self.sessions
            .read()
            .values()
            .map(|e| (Arc::clone(&e.session), e.shutdown.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_session(id: &str) -> Arc<Session> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(Session::new(id, tx))
    }

    #[test]
    fn insert_get_remove() {
        let registry = SessionRegistry::new(10);
        registry.insert(make_session("s1")).unwrap();

        assert_eq!(registry.count(), 1);
        assert!(registry.get("s1").is_some());

        assert!(registry.remove("s1").is_some());
        assert!(registry.get("s1").is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SessionRegistry::new(10);
        registry.insert(make_session("s1")).unwrap();

        assert!(registry.remove("s1").is_some());
        assert!(registry.remove("s1").is_none());
        assert!(registry.remove("s1").is_none());
    }

    #[test]
    fn capacity_is_enforced() {
        let registry = SessionRegistry::new(2);
        registry.insert(make_session("s1")).unwrap();
        registry.insert(make_session("s2")).unwrap();

        assert!(matches!(
            registry.insert(make_session("s3")),
            Err(ServerError::Capacity)
        ));

        registry.remove("s1");
        assert!(registry.insert(make_session("s3")).is_ok());
    }

    #[test]
    fn shutdown_signal_reaches_the_receiver() {
        let registry = SessionRegistry::new(10);
        let rx = registry.insert(make_session("s1")).unwrap();

        for (_, terminate) in registry.snapshot() {
            let _ = terminate.send(true);
        }
        assert!(*rx.borrow());
    }
}
