//! HTTP endpoints
//!
//! The WebSocket upgrade route plus health checks and a session listing for
//! observability.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket::WebSocketHandler;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/ws", get(WebSocketHandler::handle))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/sessions", get(list_sessions))
        .layer(TraceLayer::new_for_http());

    if state.config.server.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "sessions": state.registry.count(),
    }))
}

/// List live sessions
async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.registry.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}
