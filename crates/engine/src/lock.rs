//! Generation lock manager.
//!
//! Editing a tile regenerates its full 3x3 context, so exclusivity spans
//! the whole neighborhood: two adjacent edits racing on shared edges
//! would corrupt them. A lock expires after a fixed duration, at which
//! point any other holder may take it over; the TTL stands in for
//! cancellation of abandoned editing sessions.

use crate::error::{EngineError, EngineResult};
use crate::sync::KeyedMutex;
use mural_core::TileCoord;
use mural_metadata::{TilePatch, TileStore};
use serde::Serialize;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Result of a lock check.
#[derive(Clone, Debug, Serialize)]
pub struct LockStatus {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<OffsetDateTime>,
}

impl LockStatus {
    fn unlocked() -> Self {
        Self {
            locked: false,
            holder: None,
            expires_at: None,
        }
    }
}

/// Exclusive hold over a 3x3 neighborhood of coordinates.
pub struct LockManager {
    store: Arc<dyn TileStore>,
    mutexes: KeyedMutex,
    duration: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn TileStore>, duration: Duration) -> Self {
        Self {
            store,
            mutexes: KeyedMutex::new(),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Acquire the lock on every cell of the neighborhood around
    /// `center`, creating Empty records where absent.
    ///
    /// Fails if any cell is held by a different holder whose lock has not
    /// expired; an expired lock is silently taken over. Check-then-set
    /// runs as one critical section keyed by the center coordinate.
    pub async fn acquire(&self, center: TileCoord, holder: &str) -> EngineResult<()> {
        let _guard = self.mutexes.lock(&grid_key(center)).await;

        let cells = center.neighborhood();
        let now = OffsetDateTime::now_utc();
        let records = self.store.batch_get(&cells).await?;

        for record in &records {
            if record.locked_by_other(holder, now, self.duration) {
                let locked_at = record.locked_at.unwrap_or(now);
                return Err(EngineError::LockConflict {
                    holder: record
                        .locked_by
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    expires_at: locked_at + self.duration,
                });
            }
            if record.locked {
                if let Some(locked_at) = record.locked_at {
                    if now - locked_at > self.duration {
                        tracing::debug!(coord = %record.coord, "taking over expired lock");
                    }
                }
            }
        }

        for &cell in &cells {
            self.store.upsert(cell, TilePatch::lock(holder, now)).await?;
        }

        tracing::debug!(%center, holder, cells = cells.len(), "generation lock acquired");
        Ok(())
    }

    /// Release the neighborhood lock, touching only cells currently held
    /// by `holder`. Double release and foreign release are safe no-ops.
    pub async fn release(&self, center: TileCoord, holder: &str) -> EngineResult<()> {
        let _guard = self.mutexes.lock(&grid_key(center)).await;

        let mut released = 0usize;
        for cell in center.neighborhood() {
            let Some(record) = self.store.get(cell).await? else {
                continue;
            };
            if record.locked && record.locked_by.as_deref() == Some(holder) {
                self.store.update(cell, TilePatch::unlock()).await?;
                released += 1;
            }
        }

        if released > 0 {
            tracing::debug!(%center, holder, released, "generation lock released");
        }
        Ok(())
    }

    /// Read-only lock check. Any expired lock found along the way is
    /// cleared, so stale locks self-heal without a background sweep.
    pub async fn check(&self, center: TileCoord) -> EngineResult<LockStatus> {
        let now = OffsetDateTime::now_utc();

        for cell in center.neighborhood() {
            let Some(record) = self.store.get(cell).await? else {
                continue;
            };
            if !record.locked {
                continue;
            }
            let Some(locked_at) = record.locked_at else {
                continue;
            };

            let expires_at = locked_at + self.duration;
            if now >= expires_at {
                tracing::debug!(coord = %cell, "clearing expired lock");
                self.store.update(cell, TilePatch::unlock()).await?;
                continue;
            }

            return Ok(LockStatus {
                locked: true,
                holder: record.locked_by,
                expires_at: Some(expires_at),
            });
        }

        Ok(LockStatus::unlocked())
    }

    /// Ensure `holder` currently holds an unexpired lock on the center
    /// coordinate. Used to gate the edit confirm flow.
    pub async fn verify_held(&self, center: TileCoord, holder: &str) -> EngineResult<()> {
        let now = OffsetDateTime::now_utc();
        let record = self.store.get(center).await?;

        let held = record.is_some_and(|r| {
            r.locked
                && r.locked_by.as_deref() == Some(holder)
                && r.locked_at.is_some_and(|at| now - at <= self.duration)
        });

        if held { Ok(()) } else { Err(EngineError::LockRequired) }
    }
}

fn grid_key(center: TileCoord) -> String {
    format!("grid-{}-{}-{}", center.z, center.x, center.y)
}
