//! Blob store trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use mural_core::TileCoord;

/// Build the object key for a tile blob.
///
/// Hashed keys are the content-addressed form; the unhashed key is the
/// legacy layout kept readable for tiles written before hashing existed.
pub fn blob_key(coord: TileCoord, hash: Option<&str>) -> String {
    match hash {
        Some(hash) => format!("{}/{}/{}-{hash}.png", coord.z, coord.x, coord.y),
        None => format!("{}/{}/{}.png", coord.z, coord.x, coord.y),
    }
}

/// Content-addressed, write-once byte storage for tile images.
///
/// A blob is never mutated, only superseded by a new hash. Logical tile
/// deletion happens in the metadata store; blobs stay behind.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Read a tile's bytes. When a hash is given the content-addressed
    /// key is tried first, falling back to the unhashed legacy key.
    async fn read(&self, coord: TileCoord, hash: Option<&str>) -> StorageResult<Option<Bytes>>;

    /// Write a tile under its content hash. Writing to an existing key is
    /// a no-op: content addressing makes the rewrite byte-identical.
    async fn write(&self, coord: TileCoord, data: Bytes, hash: &str) -> StorageResult<()>;

    /// Check whether a blob exists, with the same key fallback as `read`.
    async fn exists(&self, coord: TileCoord, hash: Option<&str>) -> StorageResult<bool>;

    /// Static identifier for the backend type, used in logging.
    fn backend_name(&self) -> &'static str;
}
