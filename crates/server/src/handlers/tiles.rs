//! Tile read, claim, invalidate, and delete handlers.

use crate::error::ApiResult;
use crate::handlers::common::{StatusResponse, coord_from_path};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// GET /v1/tiles/{z}/{x}/{y}
///
/// Serves the tile's PNG, or the clearly marked placeholder when the
/// coordinate has no content. A missing tile is never a hard error.
pub async fn get_tile(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
) -> ApiResult<Response> {
    let coord = coord_from_path(z, x, y);

    match state.engine.read_tile(coord).await? {
        Some(tile) => {
            let etag = format!("\"{}\"", tile.content_hash);
            Ok((
                [
                    (header::CONTENT_TYPE, "image/png".to_string()),
                    (
                        header::CACHE_CONTROL,
                        "public, max-age=31536000, immutable".to_string(),
                    ),
                    (header::ETAG, etag),
                ],
                tile.bytes,
            )
                .into_response())
        }
        None => Ok((
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
            ],
            state.engine.placeholder_png(),
        )
            .into_response()),
    }
}

/// POST /v1/tiles/{z}/{x}/{y}/claim
pub async fn claim_tile(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
    Json(body): Json<PromptRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let coord = coord_from_path(z, x, y);
    let outcome = state.engine.claim(coord, &body.prompt).await?;
    Ok(Json(StatusResponse::new(outcome.as_str())))
}

/// POST /v1/tiles/{z}/{x}/{y}/invalidate
pub async fn invalidate_tile(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
    Json(body): Json<PromptRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let coord = coord_from_path(z, x, y);
    let outcome = state.engine.invalidate(coord, &body.prompt).await?;
    Ok(Json(StatusResponse::new(outcome.as_str())))
}

/// DELETE /v1/tiles/{z}/{x}/{y}
pub async fn delete_tile(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
) -> ApiResult<Json<OkResponse>> {
    let coord = coord_from_path(z, x, y);
    state.engine.delete(coord).await?;
    Ok(Json(OkResponse { ok: true }))
}
