//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use voiceloop_config::Settings;
use voiceloop_pipeline::ResponsePipeline;
use voiceloop_providers::ProviderGateway;

use crate::registry::SessionRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Settings>,
    /// Live session registry
    pub registry: Arc<SessionRegistry>,
    /// External provider gateway
    pub gateway: Arc<ProviderGateway>,
    /// Per-turn response pipeline
    pub pipeline: Arc<ResponsePipeline>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Settings) -> Self {
        let gateway = Arc::new(ProviderGateway::from_settings(&config));
        let pipeline = Arc::new(ResponsePipeline::new(
            Arc::clone(&gateway),
            config.providers.generation.system_preamble.clone(),
        ));

        Self {
            registry: Arc::new(SessionRegistry::new(config.server.max_sessions)),
            config: Arc::new(config),
            gateway,
            pipeline,
        }
    }
}
