//! Edit preview and confirm handlers.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{coord_from_path, holder_from_headers};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use mural_engine::{CellPos, EditSelection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct EditPreviewRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct EditPreviewResponse {
    pub ok: bool,
    /// Base64-encoded 768x768 PNG of the predicted neighborhood.
    pub grid: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEditRequest {
    /// Base64-encoded 768x768 PNG, typically the (possibly client-edited)
    /// preview grid.
    pub grid: String,
    #[serde(default)]
    pub selected: Option<Vec<CellPos>>,
    #[serde(default)]
    pub apply_to_all_new: bool,
    #[serde(default)]
    pub new_positions: Vec<CellPos>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmEditResponse {
    pub ok: bool,
    pub updated: Vec<CellPos>,
}

/// POST /v1/tiles/{z}/{x}/{y}/edit
///
/// Generates the full 3x3 preview grid without mutating anything. The
/// caller must hold the neighborhood lock.
pub async fn edit_preview(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
    headers: HeaderMap,
    Json(body): Json<EditPreviewRequest>,
) -> ApiResult<Json<EditPreviewResponse>> {
    let coord = coord_from_path(z, x, y);
    let holder = holder_from_headers(&headers)?;

    let grid = state.engine.edit_preview(coord, &body.prompt, &holder).await?;
    Ok(Json(EditPreviewResponse {
        ok: true,
        grid: BASE64.encode(&grid),
    }))
}

/// POST /v1/tiles/{z}/{x}/{y}/confirm
///
/// Blends the edited grid into the pyramid and regenerates ancestors
/// before responding.
pub async fn confirm_edit(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
    headers: HeaderMap,
    Json(body): Json<ConfirmEditRequest>,
) -> ApiResult<Json<ConfirmEditResponse>> {
    let coord = coord_from_path(z, x, y);
    let holder = holder_from_headers(&headers)?;

    let grid = BASE64
        .decode(&body.grid)
        .map_err(|e| ApiError::BadRequest(format!("grid is not valid base64: {e}")))?;

    let selection = EditSelection {
        selected: body.selected,
        apply_to_all_new: body.apply_to_all_new,
        new_positions: body.new_positions,
    };

    let updated = state
        .engine
        .confirm_edit(coord, Bytes::from(grid), selection, &holder)
        .await?;

    Ok(Json(ConfirmEditResponse {
        ok: true,
        updated: updated
            .into_iter()
            .map(|c| CellPos { x: c.x, y: c.y })
            .collect(),
    }))
}
