//! Voiceloop server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use voiceloop_config::{load_settings, Settings};
use voiceloop_server::{create_router, start_heartbeat, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Provider keys usually live in a local .env during development
    dotenvy::dotenv().ok();

    let env_name = std::env::var("VOICELOOP_ENV").ok();
    let config = load_settings(env_name.as_deref())?;

    init_tracing(&config);

    tracing::info!("Starting voiceloop server v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::new(config.clone());

    // Best-effort provider warmup; failures are logged, never fatal
    if config.providers.prewarm_enabled {
        let gateway = Arc::clone(&state.gateway);
        tokio::spawn(async move {
            gateway.prewarm().await;
        });
    }

    let _heartbeat = start_heartbeat(
        Arc::clone(&state.registry),
        Duration::from_secs(config.server.heartbeat_interval_secs),
    );

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing from the observability settings
fn init_tracing(config: &Settings) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("voiceloop={level},tower_http=warn").into()
    });

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
