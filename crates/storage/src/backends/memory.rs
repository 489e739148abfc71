//! In-memory blob storage backend for tests and experiments.

use crate::error::StorageResult;
use crate::traits::{BlobStore, blob_key};
use async_trait::async_trait;
use bytes::Bytes;
use mural_core::TileCoord;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory blob store. Everything lives in a single map guarded by a
/// std RwLock; no lock is held across an await point.
#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.objects.read().expect("blob map poisoned").len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn read(&self, coord: TileCoord, hash: Option<&str>) -> StorageResult<Option<Bytes>> {
        let objects = self.objects.read().expect("blob map poisoned");
        if let Some(hash) = hash {
            if let Some(data) = objects.get(&blob_key(coord, Some(hash))) {
                return Ok(Some(data.clone()));
            }
        }
        Ok(objects.get(&blob_key(coord, None)).cloned())
    }

    async fn write(&self, coord: TileCoord, data: Bytes, hash: &str) -> StorageResult<()> {
        let mut objects = self.objects.write().expect("blob map poisoned");
        // Write-once, same as the filesystem backend.
        objects.entry(blob_key(coord, Some(hash))).or_insert(data);
        Ok(())
    }

    async fn exists(&self, coord: TileCoord, hash: Option<&str>) -> StorageResult<bool> {
        let objects = self.objects.read().expect("blob map poisoned");
        if let Some(hash) = hash {
            if objects.contains_key(&blob_key(coord, Some(hash))) {
                return Ok(true);
            }
        }
        Ok(objects.contains_key(&blob_key(coord, None)))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
