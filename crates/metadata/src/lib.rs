//! Tile metadata store for mural.
//!
//! One record per touched coordinate: status, content/payload hashes,
//! version, and the generation lock fields. Implementations: SQLite
//! (durable) and in-memory (tests), selected once at startup.

pub mod error;
pub mod memory;
pub mod models;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use memory::MemoryStore;
pub use models::{TilePatch, TileRecord, TileStatus};
pub use store::{SqliteStore, TileStore};

use mural_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a tile store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn TileStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store))
        }
        MetadataConfig::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
