//! End-to-end engine tests over in-memory backends.

use async_trait::async_trait;
use bytes::Bytes;
use mural_core::TileCoord;
use mural_core::config::GenerationConfig;
use mural_engine::generator::{GenerationError, GridContext};
use mural_engine::{
    ClaimOutcome, EditSelection, EngineError, FallbackGenerator, LockManager, TileEngine,
    TileGenerator,
};
use mural_metadata::{MemoryStore, TileStatus, TileStore};
use mural_storage::{BlobStore, MemoryBackend};
use std::sync::Arc;
use std::time::Duration;

const HOLDER_A: &str = "session-a";
const HOLDER_B: &str = "session-b";

fn test_config() -> GenerationConfig {
    GenerationConfig {
        max_zoom: 2,
        ..Default::default()
    }
}

fn build_engine(
    generator: Arc<dyn TileGenerator>,
) -> (Arc<TileEngine>, Arc<dyn TileStore>, Arc<dyn BlobStore>) {
    let store: Arc<dyn TileStore> = Arc::new(MemoryStore::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBackend::new());
    let engine = TileEngine::new(store.clone(), blobs.clone(), generator, test_config());
    (engine, store, blobs)
}

fn stub_engine() -> (Arc<TileEngine>, Arc<dyn TileStore>, Arc<dyn BlobStore>) {
    build_engine(Arc::new(FallbackGenerator::stub_only()))
}

/// Poll until the coordinate reaches a status or the deadline passes.
async fn wait_for_status(store: &Arc<dyn TileStore>, coord: TileCoord, status: TileStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let current = store
            .get(coord)
            .await
            .unwrap()
            .map(|r| r.status)
            .unwrap_or(TileStatus::Empty);
        if current == status {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("tile {coord} never reached {status}, last seen {current}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_idle(engine: &Arc<TileEngine>) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while engine.jobs_in_flight() > 0 {
        if tokio::time::Instant::now() > deadline {
            panic!("jobs never drained");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A generator that fails outright; used to drive the rollback paths.
struct BrokenGenerator;

#[async_trait]
impl TileGenerator for BrokenGenerator {
    async fn generate(&self, _ctx: &GridContext) -> Result<Bytes, GenerationError> {
        Err(GenerationError::Transport("connection reset".to_string()))
    }
}

// ===== Claim / job queue =====

#[tokio::test]
async fn claim_generates_ready_tile() {
    let (engine, store, blobs) = stub_engine();
    let coord = TileCoord::new(2, 3, 3);

    let outcome = engine.claim(coord, "p").await.unwrap();
    assert_eq!(outcome, ClaimOutcome::Enqueued);

    wait_for_status(&store, coord, TileStatus::Ready).await;
    let record = store.get(coord).await.unwrap().unwrap();
    assert_eq!(record.content_ver, 1);
    let hash = record.content_hash.expect("ready tile has a content hash");
    assert!(record.payload_hash.is_some());
    assert!(blobs.read(coord, Some(&hash)).await.unwrap().is_some());
}

#[tokio::test]
async fn rapid_double_claim_runs_one_job() {
    let (engine, store, _blobs) = stub_engine();
    let coord = TileCoord::new(2, 1, 1);

    let (first, second) = tokio::join!(engine.claim(coord, "p"), engine.claim(coord, "p"));
    let outcomes = [first.unwrap(), second.unwrap()];
    assert!(outcomes.contains(&ClaimOutcome::Enqueued));
    assert!(outcomes.contains(&ClaimOutcome::AlreadyPending));

    wait_for_status(&store, coord, TileStatus::Ready).await;
    // Exactly one job ran: a single version bump.
    assert_eq!(store.get(coord).await.unwrap().unwrap().content_ver, 1);
}

#[tokio::test]
async fn claim_rejected_below_max_zoom() {
    let (engine, _store, _blobs) = stub_engine();
    let result = engine.claim(TileCoord::new(1, 0, 0), "p").await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn claim_rejects_bad_prompt() {
    let (engine, _store, _blobs) = stub_engine();
    let coord = TileCoord::new(2, 0, 0);
    assert!(matches!(
        engine.claim(coord, "").await,
        Err(EngineError::Validation(_))
    ));
    let long = "x".repeat(501);
    assert!(matches!(
        engine.claim(coord, &long).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn failed_fresh_claim_reverts_to_empty() {
    let (engine, store, _blobs) = build_engine(Arc::new(BrokenGenerator));
    let coord = TileCoord::new(2, 2, 2);

    engine.claim(coord, "p").await.unwrap();
    wait_for_idle(&engine).await;

    let record = store.get(coord).await.unwrap().unwrap();
    assert_eq!(record.status, TileStatus::Empty);
    assert_eq!(record.content_hash, None);
}

#[tokio::test]
async fn failed_invalidate_reverts_to_ready() {
    let (engine, store, blobs) = stub_engine();
    let coord = TileCoord::new(2, 3, 2);

    engine.claim(coord, "p").await.unwrap();
    wait_for_status(&store, coord, TileStatus::Ready).await;
    let before = store.get(coord).await.unwrap().unwrap();

    // Same stores, but every generation attempt now fails.
    let broken = TileEngine::new(
        store.clone(),
        blobs.clone(),
        Arc::new(BrokenGenerator),
        test_config(),
    );
    broken.invalidate(coord, "q").await.unwrap();
    wait_for_idle(&broken).await;

    let after = store.get(coord).await.unwrap().unwrap();
    assert_eq!(after.status, TileStatus::Ready);
    // The prior content survives the failed regeneration.
    assert_eq!(after.content_hash, before.content_hash);
}

// ===== Lock manager =====

#[tokio::test]
async fn overlapping_acquire_conflicts() {
    let store: Arc<dyn TileStore> = Arc::new(MemoryStore::new());
    let locks = LockManager::new(store.clone(), time::Duration::minutes(2));

    locks.acquire(TileCoord::new(2, 1, 1), HOLDER_A).await.unwrap();

    // (2,2,1) neighbors overlap the locked block.
    let result = locks.acquire(TileCoord::new(2, 2, 1), HOLDER_B).await;
    match result {
        Err(EngineError::LockConflict { holder, .. }) => assert_eq!(holder, HOLDER_A),
        other => panic!("expected lock conflict, got {other:?}"),
    }

    // A disjoint neighborhood is free.
    locks.acquire(TileCoord::new(2, 5, 5), HOLDER_B).await.unwrap();
}

#[tokio::test]
async fn same_holder_reacquires() {
    let store: Arc<dyn TileStore> = Arc::new(MemoryStore::new());
    let locks = LockManager::new(store.clone(), time::Duration::minutes(2));
    let center = TileCoord::new(2, 1, 1);

    locks.acquire(center, HOLDER_A).await.unwrap();
    locks.acquire(center, HOLDER_A).await.unwrap();
}

#[tokio::test]
async fn expired_lock_is_taken_over() {
    let store: Arc<dyn TileStore> = Arc::new(MemoryStore::new());
    let locks = LockManager::new(store.clone(), time::Duration::milliseconds(50));
    let center = TileCoord::new(2, 1, 1);

    locks.acquire(center, HOLDER_A).await.unwrap();
    assert!(locks.acquire(center, HOLDER_B).await.is_err());

    tokio::time::sleep(Duration::from_millis(80)).await;

    locks.acquire(center, HOLDER_B).await.unwrap();
    let record = store.get(center).await.unwrap().unwrap();
    assert_eq!(record.locked_by.as_deref(), Some(HOLDER_B));
}

#[tokio::test]
async fn release_respects_ownership() {
    let store: Arc<dyn TileStore> = Arc::new(MemoryStore::new());
    let locks = LockManager::new(store.clone(), time::Duration::minutes(2));
    let center = TileCoord::new(2, 1, 1);

    locks.acquire(center, HOLDER_A).await.unwrap();

    // B releasing A's lock is a safe no-op.
    locks.release(center, HOLDER_B).await.unwrap();
    let status = locks.check(center).await.unwrap();
    assert!(status.locked);
    assert_eq!(status.holder.as_deref(), Some(HOLDER_A));

    locks.release(center, HOLDER_A).await.unwrap();
    assert!(!locks.check(center).await.unwrap().locked);
    // Double release is also a no-op.
    locks.release(center, HOLDER_A).await.unwrap();
}

#[tokio::test]
async fn check_lazily_clears_expired_locks() {
    let store: Arc<dyn TileStore> = Arc::new(MemoryStore::new());
    let locks = LockManager::new(store.clone(), time::Duration::milliseconds(50));
    let center = TileCoord::new(2, 1, 1);

    locks.acquire(center, HOLDER_A).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let status = locks.check(center).await.unwrap();
    assert!(!status.locked);
    // The stale lock fields were cleared on the way through.
    let record = store.get(center).await.unwrap().unwrap();
    assert!(!record.locked);
    assert_eq!(record.locked_by, None);
}

// ===== Pyramid =====

#[tokio::test]
async fn leaf_write_fills_every_ancestor() {
    let (engine, store, _blobs) = stub_engine();
    let leaf = TileCoord::new(2, 3, 3);

    engine.claim(leaf, "p").await.unwrap();
    wait_for_status(&store, leaf, TileStatus::Ready).await;
    wait_for_idle(&engine).await;

    for ancestor in [TileCoord::new(1, 1, 1), TileCoord::new(0, 0, 0)] {
        let record = store.get(ancestor).await.unwrap().unwrap();
        assert_eq!(record.status, TileStatus::Ready, "ancestor {ancestor}");
        assert!(record.content_hash.is_some());
    }
}

#[tokio::test]
async fn delete_empties_ancestors_without_ready_descendants() {
    let (engine, store, _blobs) = stub_engine();
    let leaf = TileCoord::new(2, 3, 3);

    engine.claim(leaf, "p").await.unwrap();
    wait_for_status(&store, leaf, TileStatus::Ready).await;
    wait_for_idle(&engine).await;

    engine.delete(leaf).await.unwrap();
    wait_for_status(&store, leaf, TileStatus::Empty).await;

    // The detached cascade empties the whole chain: no sibling is ready.
    wait_for_status(&store, TileCoord::new(1, 1, 1), TileStatus::Empty).await;
    wait_for_status(&store, TileCoord::new(0, 0, 0), TileStatus::Empty).await;

    let record = store.get(leaf).await.unwrap().unwrap();
    assert_eq!(record.content_ver, 0);
    assert_eq!(record.content_hash, None);
}

#[tokio::test]
async fn delete_keeps_ancestors_with_ready_siblings() {
    let (engine, store, _blobs) = stub_engine();
    let leaf = TileCoord::new(2, 3, 3);
    let sibling = TileCoord::new(2, 2, 2);

    engine.claim(leaf, "p").await.unwrap();
    engine.claim(sibling, "p").await.unwrap();
    wait_for_status(&store, leaf, TileStatus::Ready).await;
    wait_for_status(&store, sibling, TileStatus::Ready).await;
    wait_for_idle(&engine).await;

    let parent = TileCoord::new(1, 1, 1);
    let before = store.get(parent).await.unwrap().unwrap();

    engine.delete(leaf).await.unwrap();
    wait_for_status(&store, leaf, TileStatus::Empty).await;

    // The shared parent recomposites from the remaining sibling instead
    // of emptying; its content changes.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let after = store.get(parent).await.unwrap().unwrap();
        if after.status == TileStatus::Ready && after.content_hash != before.content_hash {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("parent never recomposited");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ===== Scenario (spec section 8) =====

#[tokio::test]
async fn claim_invalidate_delete_scenario() {
    let (engine, store, _blobs) = stub_engine();
    let coord = TileCoord::new(2, 3, 3);

    // Claim with prompt "p": READY, version 1.
    assert_eq!(
        engine.claim(coord, "p").await.unwrap(),
        ClaimOutcome::Enqueued
    );
    wait_for_status(&store, coord, TileStatus::Ready).await;
    wait_for_idle(&engine).await;
    let first = store.get(coord).await.unwrap().unwrap();
    assert_eq!(first.content_ver, 1);
    let first_hash = first.content_hash.clone().unwrap();

    // Invalidate with prompt "q": PENDING bumps the version, then READY
    // again with a different content hash.
    assert_eq!(
        engine.invalidate(coord, "q").await.unwrap(),
        ClaimOutcome::Enqueued
    );
    wait_for_idle(&engine).await;
    wait_for_status(&store, coord, TileStatus::Ready).await;
    let second = store.get(coord).await.unwrap().unwrap();
    assert!(second.content_ver > first.content_ver);
    assert_ne!(second.content_hash.as_deref(), Some(first_hash.as_str()));

    // Delete: EMPTY, and the parent chain empties too (no siblings).
    engine.delete(coord).await.unwrap();
    wait_for_status(&store, coord, TileStatus::Empty).await;
    wait_for_status(&store, TileCoord::new(1, 1, 1), TileStatus::Empty).await;
}

// ===== Edit flow =====

#[tokio::test]
async fn edit_preview_requires_lock() {
    let (engine, _store, _blobs) = stub_engine();
    let coord = TileCoord::new(2, 1, 1);

    let result = engine.edit_preview(coord, "p", HOLDER_A).await;
    assert!(matches!(result, Err(EngineError::LockRequired)));
}

#[tokio::test]
async fn edit_preview_returns_full_grid() {
    let (engine, _store, _blobs) = stub_engine();
    let coord = TileCoord::new(2, 1, 1);

    engine.locks().acquire(coord, HOLDER_A).await.unwrap();
    let png = engine.edit_preview(coord, "p", HOLDER_A).await.unwrap();

    let img = image::load_from_memory(&png).unwrap();
    assert_eq!(img.width(), mural_core::GRID_SIZE);
    assert_eq!(img.height(), mural_core::GRID_SIZE);
}

#[tokio::test]
async fn confirm_edit_default_policy_updates_center_and_existing() {
    let (engine, store, _blobs) = stub_engine();
    let center = TileCoord::new(2, 1, 1);
    let neighbor = TileCoord::new(2, 0, 1);

    // Give one neighbor real content first.
    engine.claim(neighbor, "n").await.unwrap();
    wait_for_status(&store, neighbor, TileStatus::Ready).await;
    wait_for_idle(&engine).await;
    let neighbor_before = store.get(neighbor).await.unwrap().unwrap();

    engine.locks().acquire(center, HOLDER_A).await.unwrap();
    let grid = engine.edit_preview(center, "p", HOLDER_A).await.unwrap();
    let updated = engine
        .confirm_edit(center, grid, EditSelection::default(), HOLDER_A)
        .await
        .unwrap();

    // Center always updates; the existing neighbor blends; empty cells
    // are skipped under the default policy.
    assert!(updated.contains(&center));
    assert!(updated.contains(&neighbor));
    assert_eq!(updated.len(), 2);

    let center_after = store.get(center).await.unwrap().unwrap();
    assert_eq!(center_after.status, TileStatus::Ready);
    let neighbor_after = store.get(neighbor).await.unwrap().unwrap();
    assert_ne!(neighbor_after.content_hash, neighbor_before.content_hash);
    assert!(neighbor_after.content_ver > neighbor_before.content_ver);

    // Confirm is synchronous: ancestors are coherent on return.
    let root = store.get(TileCoord::new(0, 0, 0)).await.unwrap().unwrap();
    assert_eq!(root.status, TileStatus::Ready);
}

#[tokio::test]
async fn confirm_edit_explicit_selection() {
    let (engine, store, _blobs) = stub_engine();
    let center = TileCoord::new(2, 1, 1);
    let picked = TileCoord::new(2, 2, 2);

    engine.locks().acquire(center, HOLDER_A).await.unwrap();
    let grid = engine.edit_preview(center, "p", HOLDER_A).await.unwrap();

    let selection = EditSelection {
        selected: Some(vec![mural_engine::CellPos {
            x: picked.x,
            y: picked.y,
        }]),
        ..Default::default()
    };
    let updated = engine
        .confirm_edit(center, grid, selection, HOLDER_A)
        .await
        .unwrap();

    // Only the picked cell was written; even the center is skipped.
    assert_eq!(updated, vec![picked]);
    let center_record = store.get(center).await.unwrap().unwrap();
    assert_ne!(center_record.status, TileStatus::Ready);
    assert_eq!(
        store.get(picked).await.unwrap().unwrap().status,
        TileStatus::Ready
    );
}

#[tokio::test]
async fn confirm_edit_apply_to_all_new() {
    let (engine, store, _blobs) = stub_engine();
    let center = TileCoord::new(2, 1, 1);

    engine.locks().acquire(center, HOLDER_A).await.unwrap();
    let grid = engine.edit_preview(center, "p", HOLDER_A).await.unwrap();

    let selection = EditSelection {
        apply_to_all_new: true,
        new_positions: vec![mural_engine::CellPos { x: 0, y: 0 }],
        ..Default::default()
    };
    let updated = engine
        .confirm_edit(center, grid, selection, HOLDER_A)
        .await
        .unwrap();

    // Every cell of the interior neighborhood was new, so all 9 land.
    assert_eq!(updated.len(), 9);
    for cell in updated {
        assert_eq!(
            store.get(cell).await.unwrap().unwrap().status,
            TileStatus::Ready
        );
    }
}

// ===== Reads =====

#[tokio::test]
async fn read_missing_tile_degrades_to_placeholder() {
    let (engine, _store, _blobs) = stub_engine();

    let tile = engine.read_tile(TileCoord::new(2, 0, 0)).await.unwrap();
    assert!(tile.is_none());

    let placeholder = engine.placeholder_png();
    assert!(!placeholder.is_empty());
    let img = image::load_from_memory(&placeholder).unwrap();
    assert_eq!(img.width(), mural_core::TILE_SIZE);
}

#[tokio::test]
async fn read_ready_tile_returns_bytes_and_hash() {
    let (engine, store, _blobs) = stub_engine();
    let coord = TileCoord::new(2, 2, 3);

    engine.claim(coord, "p").await.unwrap();
    wait_for_status(&store, coord, TileStatus::Ready).await;

    let tile = engine.read_tile(coord).await.unwrap().unwrap();
    let record = store.get(coord).await.unwrap().unwrap();
    assert_eq!(Some(tile.content_hash.as_str()), record.content_hash.as_deref());
    assert!(!tile.bytes.is_empty());
}
