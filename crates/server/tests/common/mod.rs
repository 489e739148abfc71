//! Server test utilities.

use mural_core::config::AppConfig;
use mural_engine::{FallbackGenerator, TileEngine};
use mural_metadata::{MemoryStore, TileStore};
use mural_server::{AppState, create_router};
use mural_storage::{BlobStore, MemoryBackend};
use std::sync::Arc;

/// A test server wrapper with all dependencies in memory.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub store: Arc<dyn TileStore>,
    pub blobs: Arc<dyn BlobStore>,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server on in-memory backends with the stub
    /// generator and max_zoom = 2.
    pub fn new() -> Self {
        let config = AppConfig::for_testing();
        let store: Arc<dyn TileStore> = Arc::new(MemoryStore::new());
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBackend::new());
        let engine = TileEngine::new(
            store.clone(),
            blobs.clone(),
            Arc::new(FallbackGenerator::stub_only()),
            config.generation.clone(),
        );
        let state = AppState::new(config, engine);
        let router = create_router(state.clone());
        Self {
            router,
            state,
            store,
            blobs,
        }
    }
}
