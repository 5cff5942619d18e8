//! WebSocket connection handling
//!
//! One session per connection. The reader loop demultiplexes inbound frames:
//! binary audio goes to the transcription collaborator while listening,
//! textual control frames drive the session state machine. A writer task
//! owns the socket sink and drains the session's outbound queue. The
//! response pipeline runs as a spawned task so barge-in stays observable
//! while generation and synthesis are in flight.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use voiceloop_core::{ClientEvent, Outbound, ServerEvent, SessionState};
use voiceloop_pipeline::Session;

use crate::state::AppState;

/// Buffered outbound frames per connection.
const OUTBOUND_BUFFER: usize = 256;

/// WebSocket handler
pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Handle WebSocket upgrade
    pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
        ws.on_upgrade(move |socket| Self::handle_socket(socket, state))
    }

    /// Handle one WebSocket connection until it closes
    async fn handle_socket(socket: WebSocket, state: AppState) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = Arc::new(Session::new(session_id.clone(), outbound_tx));

        let mut shutdown_rx = match state.registry.insert(Arc::clone(&session)) {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting connection");
                return;
            }
        };

        tracing::info!(session = %session_id, "Client connected");

        let (sink, mut stream) = socket.split();
        let writer = tokio::spawn(write_outbound(sink, outbound_rx, Arc::clone(&session)));

        // Transcription collaborator: live stream or inert stub, per capability
        let (mut stt, mut stt_events) = state.gateway.open_stt().await;

        let transcriber = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                while let Some(event) = stt_events.recv().await {
                    session.on_transcript_event(event).await;
                }
            }
        });

        session
            .emit(ServerEvent::SessionId {
                id: session_id.clone(),
            })
            .await;
        session
            .emit(ServerEvent::State {
                value: SessionState::Listening,
            })
            .await;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(session = %session_id, "Connection terminated by liveness sweep");
                        break;
                    }
                }
                msg = stream.next() => {
                    let Some(msg) = msg else { break };
                    match msg {
                        Ok(Message::Binary(data)) => {
                            session.mark_alive();
                            // The speaker is only being listened to in Listening;
                            // frames in other states are dropped
                            if session.state() == SessionState::Listening {
                                if let Err(e) = stt.send(&data).await {
                                    tracing::debug!(
                                        session = %session_id,
                                        error = %e,
                                        "Transcription forward failed"
                                    );
                                }
                            }
                        }
                        Ok(Message::Text(text)) => {
                            session.mark_alive();
                            match serde_json::from_str::<ClientEvent>(&text) {
                                Ok(event) => Self::dispatch(&state, &session, event).await,
                                Err(e) => {
                                    tracing::debug!(
                                        session = %session_id,
                                        error = %e,
                                        "Ignoring malformed control frame"
                                    );
                                }
                            }
                        }
                        Ok(Message::Pong(_)) | Ok(Message::Ping(_)) => session.mark_alive(),
                        Ok(Message::Close(_)) => break,
                        Err(e) => {
                            tracing::error!(session = %session_id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }
            }
        }

        // Cleanup. The registry remove and the idempotent STT finish make
        // this safe when a liveness kill races a client-initiated close.
        let _ = stt.finish().await;
        state.registry.remove(&session_id);
        transcriber.abort();
        writer.abort();

        tracing::info!(session = %session_id, "Client disconnected");
    }

    /// Route one control message into the session.
    async fn dispatch(state: &AppState, session: &Arc<Session>, event: ClientEvent) {
        match event {
            ClientEvent::TurnStart { id } => session.on_turn_start(&id),
            ClientEvent::UserStopped { id } => {
                if let Some(handoff) = session.on_user_stopped(&id).await {
                    let pipeline = Arc::clone(&state.pipeline);
                    let session = Arc::clone(session);
                    tokio::spawn(async move {
                        pipeline.run(&session, handoff).await;
                    });
                }
            }
            ClientEvent::BargeIn => session.on_barge_in().await,
        }
    }
}

/// Drain the outbound queue into the socket sink.
///
/// Audio chunks are generation-checked once more at write time: a barge-in
/// between enqueue and write still discards them.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    session: Arc<Session>,
) {
    while let Some(item) = rx.recv().await {
        let message = match item {
            Outbound::Event(event) => match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    tracing::debug!(error = %e, "Unserializable event dropped");
                    continue;
                }
            },
            Outbound::Audio { pcm, generation } => {
                if generation != session.current_generation() {
                    continue;
                }
                Message::Binary(pcm)
            }
            Outbound::Ping => Message::Ping(Vec::new()),
        };

        if sink.send(message).await.is_err() {
            break;
        }
    }
}
