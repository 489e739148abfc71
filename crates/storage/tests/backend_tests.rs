//! Behavioral tests run against every blob store backend.

use bytes::Bytes;
use mural_core::TileCoord;
use mural_storage::{BlobStore, FilesystemBackend, MemoryBackend, blob_key};
use std::sync::Arc;
use tempfile::TempDir;

/// Build each backend under test, keeping temp dirs alive alongside.
async fn backends() -> Vec<(Arc<dyn BlobStore>, Option<TempDir>)> {
    let temp = tempfile::tempdir().expect("tempdir");
    let filesystem = FilesystemBackend::new(temp.path().join("tiles"))
        .await
        .expect("filesystem backend");
    vec![
        (Arc::new(MemoryBackend::new()) as Arc<dyn BlobStore>, None),
        (Arc::new(filesystem) as Arc<dyn BlobStore>, Some(temp)),
    ]
}

#[tokio::test]
async fn write_then_read_roundtrip() {
    for (store, _guard) in backends().await {
        let coord = TileCoord::new(2, 3, 3);
        let data = Bytes::from_static(b"tile pixels");

        store.write(coord, data.clone(), "cafe0123").await.unwrap();

        let read = store.read(coord, Some("cafe0123")).await.unwrap();
        assert_eq!(read, Some(data), "backend {}", store.backend_name());
    }
}

#[tokio::test]
async fn missing_blob_reads_none() {
    for (store, _guard) in backends().await {
        let coord = TileCoord::new(1, 1, 0);
        assert_eq!(store.read(coord, Some("00000000")).await.unwrap(), None);
        assert_eq!(store.read(coord, None).await.unwrap(), None);
        assert!(!store.exists(coord, Some("00000000")).await.unwrap());
    }
}

#[tokio::test]
async fn write_is_write_once() {
    for (store, _guard) in backends().await {
        let coord = TileCoord::new(3, 4, 5);
        let first = Bytes::from_static(b"first");
        let second = Bytes::from_static(b"second");

        store.write(coord, first.clone(), "feedbeef").await.unwrap();
        store.write(coord, second, "feedbeef").await.unwrap();

        // The second write must not replace the first key's bytes.
        let read = store.read(coord, Some("feedbeef")).await.unwrap();
        assert_eq!(read, Some(first), "backend {}", store.backend_name());
    }
}

#[tokio::test]
async fn hashed_read_falls_back_to_legacy_key() {
    // Legacy (pre-hashing) blobs live under the unhashed key. A hashed
    // read that misses must still find them.
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("tiles");
    let store = FilesystemBackend::new(&root).await.unwrap();

    let coord = TileCoord::new(2, 1, 1);
    let legacy_path = root.join(blob_key(coord, None));
    std::fs::create_dir_all(legacy_path.parent().unwrap()).unwrap();
    std::fs::write(&legacy_path, b"legacy tile").unwrap();

    let read = store.read(coord, Some("deadbeef")).await.unwrap();
    assert_eq!(read, Some(Bytes::from_static(b"legacy tile")));
    assert!(store.exists(coord, Some("deadbeef")).await.unwrap());
}

#[tokio::test]
async fn distinct_hashes_coexist() {
    for (store, _guard) in backends().await {
        let coord = TileCoord::new(2, 0, 0);
        store
            .write(coord, Bytes::from_static(b"v1"), "aaaa1111")
            .await
            .unwrap();
        store
            .write(coord, Bytes::from_static(b"v2"), "bbbb2222")
            .await
            .unwrap();

        assert_eq!(
            store.read(coord, Some("aaaa1111")).await.unwrap(),
            Some(Bytes::from_static(b"v1"))
        );
        assert_eq!(
            store.read(coord, Some("bbbb2222")).await.unwrap(),
            Some(Bytes::from_static(b"v2"))
        );
    }
}
