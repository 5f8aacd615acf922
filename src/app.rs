//! Application wiring
//!
//! Loads configuration and assembles an [`Engine`] with the HTTP transport
//! and the configured follow-up detector.

use std::sync::Arc;

use anyhow::{Context, Result};
use cascade_core::{Engine, FollowUpDetector, MarkerDetector, NoFollowUps};
use tracing::info;

pub mod config;
pub mod http;
pub mod loader;

pub use config::{AppConfig, DetectorKind};
pub use http::HttpTransport;
pub use loader::load_config;

/// Build the engine described by `config`
pub fn build_engine(config: &AppConfig) -> Result<Engine> {
    let transport = Arc::new(HttpTransport::new(&config.transport)?);
    let detector: Arc<dyn FollowUpDetector> = match config.detector.kind {
        DetectorKind::Marker => Arc::new(MarkerDetector),
        DetectorKind::None => Arc::new(NoFollowUps),
    };

    info!(
        endpoint = %config.transport.endpoint,
        detector = ?config.detector.kind,
        "Building query engine"
    );

    Engine::new(config.engine.to_engine_config(), transport, detector)
        .context("Invalid engine configuration")
}
