//! Voiceloop server
//!
//! Accepts WebSocket connections, one session per connection, and routes
//! frames between the client and the session orchestrator. A periodic
//! heartbeat sweep terminates half-open connections.

pub mod heartbeat;
pub mod http;
pub mod registry;
pub mod state;
pub mod websocket;

pub use heartbeat::{start_heartbeat, sweep};
pub use http::create_router;
pub use registry::SessionRegistry;
pub use state::AppState;
pub use websocket::WebSocketHandler;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Max sessions reached")]
    Capacity,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Capacity => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::WebSocket(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
