//! Application state shared across handlers.

use mural_core::config::AppConfig;
use mural_engine::TileEngine;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// The tile pyramid engine.
    pub engine: Arc<TileEngine>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: AppConfig, engine: Arc<TileEngine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }
}
