//! HTTP request handlers.

pub mod common;
pub mod edits;
pub mod locks;
pub mod tiles;

pub use edits::{confirm_edit, edit_preview};
pub use locks::{acquire_lock, check_lock, release_lock};
pub use tiles::{claim_tile, delete_tile, get_tile, invalidate_tile};

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub jobs_in_flight: usize,
}

/// GET /v1/health
///
/// Intentionally unauthenticated, for load balancer probes.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok",
        jobs_in_flight: state.engine.jobs_in_flight(),
    }))
}
