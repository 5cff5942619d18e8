//! Liveness heartbeat
//!
//! A periodic sweep over the registry. Each connection's alive flag is set
//! by any inbound frame (including pong replies) and cleared by the sweep;
//! an entry whose flag was still clear at the next sweep has been silent for
//! two full intervals and is terminated. This bounds the lifetime of
//! half-open sockets independent of the application protocol.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::registry::SessionRegistry;

/// One sweep: terminate silent connections, ping the rest.
///
/// Returns the number of connections terminated.
pub async fn sweep(registry: &SessionRegistry) -> usize {
    let mut terminated = 0;

    for (session, terminate) in registry.snapshot() {
        if session.take_alive() {
            session.send_ping().await;
        } else {
            tracing::warn!(session = %session.id(), "No heartbeat reply, terminating");
            let _ = terminate.send(true);
            terminated += 1;
        }
    }

    terminated
}

/// Spawn the periodic sweep. Returns a shutdown sender that stops the task.
pub fn start_heartbeat(registry: Arc<SessionRegistry>, interval: Duration) -> watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so fresh connections get
        // a full interval before their first probe
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let terminated = sweep(&registry).await;
                    if terminated > 0 {
                        tracing::info!(terminated, "Heartbeat sweep terminated dead connections");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Heartbeat task shutting down");
                        break;
                    }
                }
            }
        }
    });

    shutdown_tx
}
