//! The tile engine facade: claim, invalidate, delete, edit, and read
//! operations over the metadata store, blob store, lock manager, and job
//! queue.

use crate::compositor;
use crate::error::{EngineError, EngineResult};
use crate::generator::{GridContext, TileGenerator};
use crate::lock::LockManager;
use crate::pyramid;
use crate::queue::{ClaimOutcome, JobQueue};
use crate::sync::KeyedMutex;
use bytes::Bytes;
use image::RgbaImage;
use mural_core::config::GenerationConfig;
use mural_core::{ALGO_VERSION, ContentHash, TileCoord, generation_seed, payload_hash};
use mural_metadata::{TilePatch, TileStatus, TileStore};
use mural_storage::BlobStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// A readable tile: its PNG bytes plus the short content hash used as an
/// ETag.
#[derive(Clone, Debug)]
pub struct ReadyTile {
    pub bytes: Bytes,
    pub content_hash: String,
}

/// Grid position within an edit, absolute coordinates at the edited zoom
/// level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub x: u32,
    pub y: u32,
}

/// Which cells of an edited 3x3 grid get written.
///
/// With an explicit selection only those cells are considered. Otherwise
/// the default policy applies: the center always updates; other cells
/// update only if they already have content, or are newly created and the
/// caller opted into applying all new cells.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EditSelection {
    #[serde(default)]
    pub selected: Option<Vec<CellPos>>,
    #[serde(default)]
    pub apply_to_all_new: bool,
    #[serde(default)]
    pub new_positions: Vec<CellPos>,
}

/// The tile pyramid consistency engine.
///
/// One instance per process; all request handling goes through it.
pub struct TileEngine {
    store: Arc<dyn TileStore>,
    blobs: Arc<dyn BlobStore>,
    generator: Arc<dyn TileGenerator>,
    locks: LockManager,
    queue: JobQueue,
    mutexes: KeyedMutex,
    config: GenerationConfig,
    placeholder: OnceLock<Bytes>,
}

impl TileEngine {
    /// Create a new engine.
    ///
    /// # Panics
    ///
    /// Panics if `max_zoom` exceeds 30 (grid extents would overflow the
    /// coordinate type).
    pub fn new(
        store: Arc<dyn TileStore>,
        blobs: Arc<dyn BlobStore>,
        generator: Arc<dyn TileGenerator>,
        config: GenerationConfig,
    ) -> Arc<Self> {
        assert!(
            config.max_zoom <= 30,
            "max_zoom must be at most 30, got {}",
            config.max_zoom
        );
        let locks = LockManager::new(store.clone(), config.lock_duration());
        Arc::new(Self {
            store,
            blobs,
            generator,
            locks,
            queue: JobQueue::new(),
            mutexes: KeyedMutex::new(),
            config,
            placeholder: OnceLock::new(),
        })
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Number of generation jobs currently in flight.
    pub fn jobs_in_flight(&self) -> usize {
        self.queue.in_flight()
    }

    fn validate_coord(&self, coord: TileCoord) -> EngineResult<()> {
        coord
            .validate(self.config.max_zoom)
            .map_err(|e| EngineError::Validation(e.to_string()))
    }

    fn ensure_max_zoom(&self, coord: TileCoord) -> EngineResult<()> {
        if coord.z != self.config.max_zoom {
            return Err(EngineError::Validation(format!(
                "generation only at max zoom {} (got {})",
                self.config.max_zoom, coord.z
            )));
        }
        Ok(())
    }

    fn validate_prompt(&self, prompt: &str) -> EngineResult<()> {
        if prompt.is_empty() {
            return Err(EngineError::Validation("prompt is required".to_string()));
        }
        if prompt.chars().count() > self.config.prompt_max_len {
            return Err(EngineError::Validation(format!(
                "prompt exceeds {} characters",
                self.config.prompt_max_len
            )));
        }
        Ok(())
    }

    /// Claim a tile for generation.
    ///
    /// Marks the record Pending and dispatches a detached generation job.
    /// A second rapid claim for the same coordinate observes
    /// `AlreadyPending` and starts nothing.
    pub async fn claim(
        self: &Arc<Self>,
        coord: TileCoord,
        prompt: &str,
    ) -> EngineResult<ClaimOutcome> {
        self.validate_coord(coord)?;
        self.ensure_max_zoom(coord)?;
        self.validate_prompt(prompt)?;

        let existing = self.store.get(coord).await?;
        if existing.as_ref().map(|r| r.status) == Some(TileStatus::Pending) {
            tracing::debug!(%coord, "claim skipped, tile already pending");
            return Ok(ClaimOutcome::AlreadyPending);
        }

        if !self.queue.try_begin(coord) {
            tracing::debug!(%coord, "claim skipped, job already running");
            return Ok(ClaimOutcome::AlreadyPending);
        }

        let prior = existing.map(|r| r.status).unwrap_or(TileStatus::Empty);
        if let Err(e) = self.store.upsert(coord, TilePatch::pending()).await {
            self.queue.finish(coord);
            return Err(e.into());
        }

        tracing::info!(%coord, "tile generation enqueued");
        self.spawn_generation(coord, prompt.to_string(), prior);
        Ok(ClaimOutcome::Enqueued)
    }

    /// Invalidate a Ready tile: bump its version, mark it Pending, and
    /// regenerate with a new prompt. The old hashes stay on the record so
    /// a failure can revert to the prior Ready state.
    pub async fn invalidate(
        self: &Arc<Self>,
        coord: TileCoord,
        prompt: &str,
    ) -> EngineResult<ClaimOutcome> {
        self.validate_coord(coord)?;
        self.ensure_max_zoom(coord)?;
        self.validate_prompt(prompt)?;

        let record = self
            .store
            .get(coord)
            .await?
            .ok_or_else(|| EngineError::NotFound(coord.to_string()))?;

        if record.status == TileStatus::Pending || !self.queue.try_begin(coord) {
            tracing::debug!(%coord, "invalidate skipped, job already running");
            return Ok(ClaimOutcome::AlreadyPending);
        }

        let prior = record.status;
        if let Err(e) = self
            .store
            .update(coord, TilePatch::pending_versioned(record.content_ver + 1))
            .await
        {
            self.queue.finish(coord);
            return Err(e.into());
        }

        tracing::info!(%coord, "tile invalidated, regeneration enqueued");
        self.spawn_generation(coord, prompt.to_string(), prior);
        Ok(ClaimOutcome::Enqueued)
    }

    /// Delete a tile: flip its record Empty (the blob stays behind) and
    /// walk the ancestors in a detached task.
    pub async fn delete(self: &Arc<Self>, coord: TileCoord) -> EngineResult<()> {
        self.validate_coord(coord)?;
        self.ensure_max_zoom(coord)?;

        self.store.upsert(coord, TilePatch::empty()).await?;
        tracing::info!(%coord, "tile deleted");

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) =
                pyramid::regenerate_ancestors(&engine.store, &engine.blobs, vec![coord]).await
            {
                tracing::error!(%coord, error = %e, "ancestor regeneration after delete failed");
            }
        });

        Ok(())
    }

    /// Read a Ready tile's bytes. None means the caller should degrade to
    /// the placeholder, never a hard error.
    pub async fn read_tile(&self, coord: TileCoord) -> EngineResult<Option<ReadyTile>> {
        self.validate_coord(coord)?;

        let Some(record) = self.store.get(coord).await? else {
            return Ok(None);
        };
        if !record.is_ready() {
            return Ok(None);
        }
        let Some(hash) = record.content_hash else {
            return Ok(None);
        };

        match self.blobs.read(coord, Some(&hash)).await? {
            Some(bytes) => Ok(Some(ReadyTile {
                bytes,
                content_hash: hash,
            })),
            None => {
                tracing::warn!(%coord, %hash, "ready tile has no blob");
                Ok(None)
            }
        }
    }

    /// The placeholder PNG served for tiles with no content.
    pub fn placeholder_png(&self) -> Bytes {
        self.placeholder
            .get_or_init(|| {
                compositor::encode_png(&compositor::placeholder_tile())
                    .expect("placeholder tile must encode")
            })
            .clone()
    }

    /// Generate a full 3x3 preview grid for the edit flow, without
    /// mutating anything. Requires the caller to hold the neighborhood
    /// lock.
    pub async fn edit_preview(
        &self,
        coord: TileCoord,
        prompt: &str,
        holder: &str,
    ) -> EngineResult<Bytes> {
        self.validate_coord(coord)?;
        self.ensure_max_zoom(coord)?;
        self.validate_prompt(prompt)?;
        self.locks.verify_held(coord, holder).await?;

        let ctx = self.build_context(coord, prompt, true).await?;
        let grid_png = self.generator.generate(&ctx).await?;
        let grid = compositor::normalize_grid(compositor::decode_png(&grid_png)?);
        compositor::encode_png(&grid)
    }

    /// Apply an edited 3x3 grid to the pyramid: blend targeted cells into
    /// existing content, write blobs, promote records, then regenerate
    /// every ancestor. Everything is awaited; when this returns the
    /// pyramid is coherent.
    pub async fn confirm_edit(
        &self,
        coord: TileCoord,
        grid_png: Bytes,
        selection: EditSelection,
        holder: &str,
    ) -> EngineResult<Vec<TileCoord>> {
        self.validate_coord(coord)?;
        self.ensure_max_zoom(coord)?;
        self.locks.verify_held(coord, holder).await?;

        let _guard = self
            .mutexes
            .lock(&format!("confirm-{}-{}-{}", coord.z, coord.x, coord.y))
            .await;

        let grid = compositor::normalize_grid(compositor::decode_png(&grid_png)?);
        let mask = compositor::radial_mask(mural_core::GRID_SIZE);
        let selected: Option<HashSet<CellPos>> = selection
            .selected
            .filter(|s| !s.is_empty())
            .map(|s| s.into_iter().collect());
        let accept_new = selection.apply_to_all_new && !selection.new_positions.is_empty();

        let mut updated = Vec::new();
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let Some(cell) = coord.offset(dx, dy) else {
                    continue;
                };
                let col = (dx + 1) as u32;
                let row = (dy + 1) as u32;
                let is_center = dx == 0 && dy == 0;

                let record = self.store.get(cell).await?;
                let ready_hash = record
                    .as_ref()
                    .filter(|r| r.is_ready())
                    .and_then(|r| r.content_hash.clone());
                let existing = self.blobs.read(cell, ready_hash.as_deref()).await?;

                if let Some(ref selected) = selected {
                    if !selected.contains(&CellPos {
                        x: cell.x,
                        y: cell.y,
                    }) {
                        continue;
                    }
                } else if existing.is_none() && !accept_new && !is_center {
                    continue;
                }

                let generated = compositor::extract_cell(&grid, col, row);
                let final_tile = match &existing {
                    Some(bytes) => {
                        let old = compositor::decode_png(bytes)?;
                        compositor::blend_cell(&old, &generated, &mask, col, row)
                    }
                    None => generated,
                };

                let content_ver = record.map(|r| r.content_ver).unwrap_or(0) + 1;
                self.commit_tile(cell, &final_tile, None, content_ver).await?;
                updated.push(cell);
            }
        }

        tracing::info!(%coord, updated = updated.len(), "edit confirmed");

        pyramid::regenerate_ancestors(&self.store, &self.blobs, updated.clone()).await?;
        Ok(updated)
    }

    /// Encode, hash, persist, and promote one tile to Ready.
    async fn commit_tile(
        &self,
        coord: TileCoord,
        img: &RgbaImage,
        seed: Option<String>,
        content_ver: i64,
    ) -> EngineResult<String> {
        let png = compositor::encode_png(img)?;
        let bytes_hash = ContentHash::compute(&png).short_hex();
        let payload = payload_hash(
            ALGO_VERSION,
            content_ver,
            &bytes_hash,
            seed.as_deref().unwrap_or(""),
        );

        self.blobs.write(coord, png, &bytes_hash).await?;
        self.store
            .upsert(
                coord,
                TilePatch::ready(payload, bytes_hash.clone(), seed, content_ver),
            )
            .await?;
        Ok(bytes_hash)
    }

    /// Assemble the generation context: neighbor records, their blobs,
    /// and the 768x768 context grid PNG.
    async fn build_context(
        &self,
        center: TileCoord,
        prompt: &str,
        include_center: bool,
    ) -> EngineResult<GridContext> {
        let mut cells: [[Option<RgbaImage>; 3]; 3] = Default::default();
        let mut present = [[false; 3]; 3];

        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let is_center = dx == 0 && dy == 0;
                if is_center && !include_center {
                    continue;
                }
                let Some(cell) = center.offset(dx, dy) else {
                    continue;
                };
                let Some(record) = self.store.get(cell).await? else {
                    continue;
                };
                if !record.is_ready() {
                    continue;
                }
                let Some(bytes) = self
                    .blobs
                    .read(cell, record.content_hash.as_deref())
                    .await?
                else {
                    continue;
                };
                match compositor::decode_png(&bytes) {
                    Ok(img) => {
                        let row = (dy + 1) as usize;
                        let col = (dx + 1) as usize;
                        cells[row][col] = Some(img);
                        present[row][col] = true;
                    }
                    Err(e) => {
                        tracing::warn!(coord = %cell, error = %e, "neighbor blob undecodable");
                    }
                }
            }
        }

        let grid = compositor::build_context_grid(&cells);
        Ok(GridContext {
            coord: center,
            prompt: prompt.to_string(),
            seed: generation_seed(center, &self.config.style, prompt),
            context_png: compositor::encode_png(&grid)?,
            present,
        })
    }

    /// Dispatch a detached generation job. The job runs to completion
    /// whether or not the requesting client is still listening; the lock
    /// TTL is the substitute cancellation mechanism.
    fn spawn_generation(self: &Arc<Self>, coord: TileCoord, prompt: String, prior: TileStatus) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_generation(coord, prompt, prior).await;
        });
    }

    /// Execute one generation job and settle its terminal state. On
    /// failure the record reverts to the prior stable status so a
    /// coordinate never sticks Pending. No automatic retry.
    async fn run_generation(self: Arc<Self>, coord: TileCoord, prompt: String, prior: TileStatus) {
        let result = self.generate_and_commit(coord, &prompt).await;

        match result {
            Ok(content_ver) => {
                tracing::info!(%coord, content_ver, "tile generation complete");
                if let Err(e) =
                    pyramid::regenerate_ancestors(&self.store, &self.blobs, vec![coord]).await
                {
                    tracing::error!(%coord, error = %e, "ancestor regeneration failed");
                }
            }
            Err(e) => {
                tracing::error!(%coord, error = %e, "tile generation failed, reverting status");
                let revert = match prior {
                    TileStatus::Ready => TilePatch::status(TileStatus::Ready),
                    _ => TilePatch::empty(),
                };
                if let Err(revert_err) = self.store.upsert(coord, revert).await {
                    tracing::error!(%coord, error = %revert_err, "status rollback failed");
                }
            }
        }

        self.queue.finish(coord);
    }

    /// The generation pipeline body: context, generate (with stub
    /// fallback), extract the center, hash, write blob, promote Ready.
    /// Serialized per coordinate through the named mutex.
    async fn generate_and_commit(&self, coord: TileCoord, prompt: &str) -> EngineResult<i64> {
        let _guard = self
            .mutexes
            .lock(&format!("tile-{}-{}-{}", coord.z, coord.x, coord.y))
            .await;

        let base_ver = self
            .store
            .get(coord)
            .await?
            .map(|r| r.content_ver)
            .unwrap_or(0);

        let ctx = self.build_context(coord, prompt, false).await?;
        let grid_png = self.generator.generate(&ctx).await?;
        let grid = compositor::decode_png(&grid_png)?;
        let center = compositor::extract_cell(&grid, 1, 1);

        let content_ver = base_ver + 1;
        self.commit_tile(coord, &center, Some(ctx.seed.clone()), content_ver)
            .await?;
        Ok(content_ver)
    }
}
