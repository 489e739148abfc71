//! Bottom-up ancestor regeneration.
//!
//! After any leaf write or delete, every ancestor up to the root is
//! recomputed level by level. The walk is iterative with an explicit
//! per-level frontier, which makes "finish level k before starting k-1"
//! structural: a parent regenerates only after all of its children's
//! writes for the current change are durable.

use crate::compositor;
use crate::error::EngineResult;
use image::RgbaImage;
use mural_core::{ALGO_VERSION, ContentHash, TileCoord, payload_hash};
use mural_metadata::{TilePatch, TileStore};
use mural_storage::BlobStore;
use std::collections::HashSet;
use std::sync::Arc;

/// Regenerate every ancestor of the changed coordinates up to level 0.
///
/// All coordinates in `changed` must sit at the same zoom level. Returns
/// the total number of ancestors touched.
pub async fn regenerate_ancestors(
    store: &Arc<dyn TileStore>,
    blobs: &Arc<dyn BlobStore>,
    changed: Vec<TileCoord>,
) -> EngineResult<usize> {
    let mut frontier: HashSet<TileCoord> = changed.into_iter().collect();
    let mut touched = 0usize;

    loop {
        let parents: HashSet<TileCoord> =
            frontier.iter().filter_map(TileCoord::parent).collect();
        if parents.is_empty() {
            break;
        }

        for &parent in &parents {
            rebuild_parent(store, blobs, parent).await?;
            touched += 1;
        }

        frontier = parents;
    }

    Ok(touched)
}

/// Recompute a single parent from its children's current state.
///
/// With at least one Ready child the parent becomes a composite of all
/// Ready children, each scaled to fill its quadrant. With none it is
/// marked Empty, hashes and version cleared.
async fn rebuild_parent(
    store: &Arc<dyn TileStore>,
    blobs: &Arc<dyn BlobStore>,
    parent: TileCoord,
) -> EngineResult<()> {
    let children = parent.children();
    let records = store.batch_get(&children).await?;

    let mut images: [Option<RgbaImage>; 4] = Default::default();
    for (i, record) in records.iter().enumerate() {
        if !record.is_ready() {
            continue;
        }
        let Some(hash) = record.content_hash.as_deref() else {
            continue;
        };
        match blobs.read(children[i], Some(hash)).await? {
            Some(bytes) => match compositor::decode_png(&bytes) {
                Ok(img) => images[i] = Some(img),
                Err(e) => {
                    tracing::warn!(coord = %children[i], error = %e, "child blob undecodable, skipping");
                }
            },
            None => {
                tracing::warn!(coord = %children[i], hash, "ready child has no blob, skipping");
            }
        }
    }

    if images.iter().all(Option::is_none) {
        store.upsert(parent, TilePatch::empty()).await?;
        tracing::debug!(%parent, "no ready children, parent marked empty");
        return Ok(());
    }

    let composed = compositor::compose_parent(&images);
    let png = compositor::encode_png(&composed)?;
    let bytes_hash = ContentHash::compute(&png).short_hex();

    let content_ver = store
        .get(parent)
        .await?
        .map(|r| r.content_ver)
        .unwrap_or(0)
        + 1;
    let payload = payload_hash(ALGO_VERSION, content_ver, &bytes_hash, "");

    blobs.write(parent, png, &bytes_hash).await?;
    store
        .upsert(
            parent,
            TilePatch::ready(payload, bytes_hash, None, content_ver),
        )
        .await?;

    tracing::debug!(%parent, content_ver, "parent recomposited");
    Ok(())
}
