//! Tile pyramid consistency engine for mural.
//!
//! Guarantees the pyramid stays coherent under concurrent edits, slow or
//! failing generation calls, and partial failures:
//! - content-addressed versioning ([`mural_core::hash`])
//! - the 3x3 neighborhood generation lock ([`lock`])
//! - a single-flight, idempotent job queue ([`queue`])
//! - the neighbor-blending edit compositor ([`compositor`])
//! - bottom-up ancestor regeneration ([`pyramid`])
//!
//! [`TileEngine`] ties them together behind one facade.

pub mod compositor;
pub mod engine;
pub mod error;
pub mod generator;
pub mod lock;
pub mod pyramid;
pub mod queue;
pub mod sync;

pub use engine::{CellPos, EditSelection, ReadyTile, TileEngine};
pub use error::{EngineError, EngineResult};
pub use generator::{FallbackGenerator, GenerationError, GridContext, StubGenerator, TileGenerator};
pub use lock::{LockManager, LockStatus};
pub use queue::{ClaimOutcome, JobQueue};
