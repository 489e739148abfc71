//! Generation lock handlers.

use crate::error::ApiResult;
use crate::handlers::common::{coord_from_path, holder_from_headers};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use mural_engine::{EngineError, LockStatus};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LockResponse {
    pub success: bool,
}

/// GET /v1/locks/{z}/{x}/{y}
pub async fn check_lock(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
) -> ApiResult<Json<LockStatus>> {
    let coord = coord_from_path(z, x, y);
    coord
        .validate(state.engine.config().max_zoom)
        .map_err(EngineError::from)?;
    let status = state.engine.locks().check(coord).await?;
    Ok(Json(status))
}

/// POST /v1/locks/{z}/{x}/{y}
///
/// Acquire the 3x3 neighborhood lock; a conflicting unexpired holder
/// yields 423 Locked.
pub async fn acquire_lock(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
    headers: HeaderMap,
) -> ApiResult<Json<LockResponse>> {
    let coord = coord_from_path(z, x, y);
    coord
        .validate(state.engine.config().max_zoom)
        .map_err(EngineError::from)?;
    let holder = holder_from_headers(&headers)?;
    state.engine.locks().acquire(coord, &holder).await?;
    Ok(Json(LockResponse { success: true }))
}

/// DELETE /v1/locks/{z}/{x}/{y}
pub async fn release_lock(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
    headers: HeaderMap,
) -> ApiResult<Json<LockResponse>> {
    let coord = coord_from_path(z, x, y);
    coord
        .validate(state.engine.config().max_zoom)
        .map_err(EngineError::from)?;
    let holder = holder_from_headers(&headers)?;
    state.engine.locks().release(coord, &holder).await?;
    Ok(Json(LockResponse { success: true }))
}
