//! Single-flight job tracking.
//!
//! At most one generation job may be in flight per coordinate.
//! Re-submission while a job runs is a no-op the caller sees as
//! "already in progress", never duplicate work.

use mural_core::TileCoord;
use std::collections::HashSet;
use std::sync::Mutex;

/// Outcome of a claim or invalidate request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// A new job was started for this coordinate.
    Enqueued,
    /// A job is already in flight; nothing was started.
    AlreadyPending,
}

impl ClaimOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enqueued => "ENQUEUED",
            Self::AlreadyPending => "ALREADY_PENDING",
        }
    }
}

/// The running set behind the single-flight guarantee.
#[derive(Default)]
pub struct JobQueue {
    running: Mutex<HashSet<TileCoord>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to start a job for a coordinate. Returns false when one is
    /// already in flight.
    pub fn try_begin(&self, coord: TileCoord) -> bool {
        self.running.lock().expect("running set poisoned").insert(coord)
    }

    /// Mark a coordinate's job finished, successful or not.
    pub fn finish(&self, coord: TileCoord) {
        self.running.lock().expect("running set poisoned").remove(&coord);
    }

    /// Whether a job is currently in flight for a coordinate.
    pub fn is_running(&self, coord: TileCoord) -> bool {
        self.running
            .lock()
            .expect("running set poisoned")
            .contains(&coord)
    }

    /// Number of jobs currently in flight.
    pub fn in_flight(&self) -> usize {
        self.running.lock().expect("running set poisoned").len()
    }
}
