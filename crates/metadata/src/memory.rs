//! In-memory tile store for tests and single-session runs.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{TilePatch, TileRecord};
use crate::store::TileStore;
use async_trait::async_trait;
use mural_core::TileCoord;
use std::collections::HashMap;
use std::sync::RwLock;
use time::OffsetDateTime;

/// In-memory tile store. Merge semantics are shared with the SQLite
/// implementation through `TilePatch::apply`.
#[derive(Default)]
pub struct MemoryStore {
    tiles: RwLock<HashMap<TileCoord, TileRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted records.
    pub fn len(&self) -> usize {
        self.tiles.read().expect("tile map poisoned").len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TileStore for MemoryStore {
    async fn get(&self, coord: TileCoord) -> MetadataResult<Option<TileRecord>> {
        Ok(self
            .tiles
            .read()
            .expect("tile map poisoned")
            .get(&coord)
            .cloned())
    }

    async fn upsert(&self, coord: TileCoord, patch: TilePatch) -> MetadataResult<TileRecord> {
        let now = OffsetDateTime::now_utc();
        let mut tiles = self.tiles.write().expect("tile map poisoned");
        let record = tiles
            .entry(coord)
            .or_insert_with(|| TileRecord::new_empty(coord, now));
        patch.apply(record, now);
        Ok(record.clone())
    }

    async fn update(&self, coord: TileCoord, patch: TilePatch) -> MetadataResult<TileRecord> {
        let now = OffsetDateTime::now_utc();
        let mut tiles = self.tiles.write().expect("tile map poisoned");
        let record = tiles
            .get_mut(&coord)
            .ok_or_else(|| MetadataError::NotFound(format!("tile {coord}")))?;
        patch.apply(record, now);
        Ok(record.clone())
    }

    async fn batch_get(&self, coords: &[TileCoord]) -> MetadataResult<Vec<TileRecord>> {
        let now = OffsetDateTime::now_utc();
        let tiles = self.tiles.read().expect("tile map poisoned");
        Ok(coords
            .iter()
            .map(|coord| {
                tiles
                    .get(coord)
                    .cloned()
                    .unwrap_or_else(|| TileRecord::new_empty(*coord, now))
            })
            .collect())
    }

    async fn list_pending(&self) -> MetadataResult<Vec<TileRecord>> {
        let tiles = self.tiles.read().expect("tile map poisoned");
        Ok(tiles
            .values()
            .filter(|r| r.status == crate::models::TileStatus::Pending)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }
}
