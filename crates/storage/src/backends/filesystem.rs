//! Local filesystem blob storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobStore, blob_key};
use async_trait::async_trait;
use bytes::Bytes;
use mural_core::TileCoord;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem blob store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the full path for a key.
    ///
    /// Keys are built internally from numeric coordinates and hex hashes,
    /// but reject traversal components anyway so a corrupted hash string
    /// can never escape the storage root.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }
        Ok(self.root.join(key))
    }

    async fn read_key(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn key_exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn read(&self, coord: TileCoord, hash: Option<&str>) -> StorageResult<Option<Bytes>> {
        if let Some(hash) = hash {
            if let Some(data) = self.read_key(&blob_key(coord, Some(hash))).await? {
                return Ok(Some(data));
            }
            tracing::debug!(%coord, hash, "hashed blob missing, trying legacy key");
        }
        self.read_key(&blob_key(coord, None)).await
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn write(&self, coord: TileCoord, data: Bytes, hash: &str) -> StorageResult<()> {
        let path = self.key_path(&blob_key(coord, Some(hash)))?;

        // Write-once: an existing key already holds these exact bytes.
        if fs::try_exists(&path).await.map_err(StorageError::Io)? {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a uniquely named temp file, fsync, then rename so a
        // crashed write never leaves a partial blob under the final key.
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, coord: TileCoord, hash: Option<&str>) -> StorageResult<bool> {
        if let Some(hash) = hash {
            if self.key_exists(&blob_key(coord, Some(hash))).await? {
                return Ok(true);
            }
        }
        self.key_exists(&blob_key(coord, None)).await
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_key_path_rejects_traversal() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        assert!(backend.key_path("../escape.png").is_err());
        assert!(backend.key_path("/absolute.png").is_err());
        assert!(backend.key_path("2/3/1-aabb.png").is_ok());
    }
}
