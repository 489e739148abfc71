//! Tile record model and patch types.

use mural_core::TileCoord;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Lifecycle status of a tile coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TileStatus {
    /// No content; the record may exist solely to carry a lock.
    #[default]
    Empty,
    /// A generation job is in flight for this coordinate.
    Pending,
    /// Content is written and addressable by its hashes.
    Ready,
}

impl TileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::Pending => "PENDING",
            Self::Ready => "READY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EMPTY" => Some(Self::Empty),
            "PENDING" => Some(Self::Pending),
            "READY" => Some(Self::Ready),
            _ => None,
        }
    }
}

impl fmt::Display for TileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-coordinate tile record.
///
/// Invariant: `payload_hash` and `content_hash` are present iff
/// `status == Ready`. `TilePatch` constructors are the only way mutations
/// enter a store, and each one preserves this.
#[derive(Clone, Debug, PartialEq)]
pub struct TileRecord {
    pub coord: TileCoord,
    pub status: TileStatus,
    pub payload_hash: Option<String>,
    pub content_hash: Option<String>,
    pub seed: Option<String>,
    /// Monotonic while the tile lives; reset to 0 on delete.
    pub content_ver: i64,
    pub locked: bool,
    pub locked_at: Option<OffsetDateTime>,
    pub locked_by: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TileRecord {
    /// A fresh Empty record, as implicitly created on first lock/claim.
    pub fn new_empty(coord: TileCoord, now: OffsetDateTime) -> Self {
        Self {
            coord,
            status: TileStatus::Empty,
            payload_hash: None,
            content_hash: None,
            seed: None,
            content_ver: 0,
            locked: false,
            locked_at: None,
            locked_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == TileStatus::Ready
    }

    /// Whether an unexpired lock is held by someone other than `holder`.
    pub fn locked_by_other(
        &self,
        holder: &str,
        now: OffsetDateTime,
        lock_duration: time::Duration,
    ) -> bool {
        if !self.locked {
            return false;
        }
        let Some(locked_at) = self.locked_at else {
            return false;
        };
        if now - locked_at > lock_duration {
            return false;
        }
        self.locked_by.as_deref() != Some(holder)
    }
}

/// A partial mutation of a tile record.
///
/// `Option<Option<T>>` fields distinguish "leave untouched" (None) from
/// "set to NULL" (Some(None)). Use the constructors; they keep the
/// hashes-iff-Ready invariant.
#[derive(Clone, Debug, Default)]
pub struct TilePatch {
    pub status: Option<TileStatus>,
    pub payload_hash: Option<Option<String>>,
    pub content_hash: Option<Option<String>>,
    pub seed: Option<Option<String>>,
    pub content_ver: Option<i64>,
    pub locked: Option<bool>,
    pub locked_at: Option<Option<OffsetDateTime>>,
    pub locked_by: Option<Option<String>>,
}

impl TilePatch {
    /// Promote to Ready with fresh hashes and version.
    pub fn ready(
        payload_hash: String,
        content_hash: String,
        seed: Option<String>,
        content_ver: i64,
    ) -> Self {
        Self {
            status: Some(TileStatus::Ready),
            payload_hash: Some(Some(payload_hash)),
            content_hash: Some(Some(content_hash)),
            seed: Some(seed),
            content_ver: Some(content_ver),
            ..Default::default()
        }
    }

    /// Mark Pending without touching anything else (claim path; repeating
    /// it on an already-Pending record is harmless).
    pub fn pending() -> Self {
        Self {
            status: Some(TileStatus::Pending),
            ..Default::default()
        }
    }

    /// Mark Pending and bump the version (invalidate path). The old
    /// hashes stay in place so a failed regeneration can revert to Ready.
    pub fn pending_versioned(content_ver: i64) -> Self {
        Self {
            status: Some(TileStatus::Pending),
            content_ver: Some(content_ver),
            ..Default::default()
        }
    }

    /// Wipe to Empty: clear hashes and seed, version back to 0.
    pub fn empty() -> Self {
        Self {
            status: Some(TileStatus::Empty),
            payload_hash: Some(None),
            content_hash: Some(None),
            seed: Some(None),
            content_ver: Some(0),
            ..Default::default()
        }
    }

    /// Revert only the status (job-failure rollback).
    pub fn status(status: TileStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Take the generation lock for a holder.
    pub fn lock(holder: &str, at: OffsetDateTime) -> Self {
        Self {
            locked: Some(true),
            locked_at: Some(Some(at)),
            locked_by: Some(Some(holder.to_string())),
            ..Default::default()
        }
    }

    /// Clear the generation lock.
    pub fn unlock() -> Self {
        Self {
            locked: Some(false),
            locked_at: Some(None),
            locked_by: Some(None),
            ..Default::default()
        }
    }

    /// Apply this patch to a record in place, stamping `updated_at`.
    /// Shared by every store implementation so merge semantics agree.
    pub fn apply(&self, record: &mut TileRecord, now: OffsetDateTime) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(ref payload_hash) = self.payload_hash {
            record.payload_hash = payload_hash.clone();
        }
        if let Some(ref content_hash) = self.content_hash {
            record.content_hash = content_hash.clone();
        }
        if let Some(ref seed) = self.seed {
            record.seed = seed.clone();
        }
        if let Some(content_ver) = self.content_ver {
            record.content_ver = content_ver;
        }
        if let Some(locked) = self.locked {
            record.locked = locked;
        }
        if let Some(locked_at) = self.locked_at {
            record.locked_at = locked_at;
        }
        if let Some(ref locked_by) = self.locked_by {
            record.locked_by = locked_by.clone();
        }
        record.updated_at = now;
    }
}
