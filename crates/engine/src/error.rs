//! Engine error taxonomy.

use crate::generator::GenerationError;
use thiserror::Error;
use time::OffsetDateTime;

/// Errors surfaced by the tile engine.
///
/// Validation and lock conflicts are rejected before any mutation.
/// Generation failures are recovered via the stub fallback and only reach
/// callers when the stub itself fails. Persistence failures abort the
/// current job after its status rollback.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("tile not found: {0}")]
    NotFound(String),

    #[error("neighborhood is being edited by {holder} until {expires_at}")]
    LockConflict {
        holder: String,
        expires_at: OffsetDateTime,
    },

    #[error("generation lock required")]
    LockRequired,

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("metadata error: {0}")]
    Metadata(#[from] mural_metadata::MetadataError),

    #[error("storage error: {0}")]
    Storage(#[from] mural_storage::StorageError),

    #[error("image error: {0}")]
    Image(String),
}

impl From<image::ImageError> for EngineError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e.to_string())
    }
}

impl From<mural_core::Error> for EngineError {
    fn from(e: mural_core::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
