//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::http::HeaderMap;
use mural_core::TileCoord;
use serde::Serialize;

/// Header carrying the editing session identifier used as the lock
/// holder id.
pub const SESSION_HEADER: &str = "x-session-id";

/// Build a coordinate from path parameters.
pub fn coord_from_path(z: u8, x: u32, y: u32) -> TileCoord {
    TileCoord::new(z, x, y)
}

/// Extract the lock holder id from request headers.
pub fn holder_from_headers(headers: &HeaderMap) -> ApiResult<String> {
    let value = headers
        .get(SESSION_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("{SESSION_HEADER} header is required")))?;
    let holder = value
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{SESSION_HEADER} header is not valid text")))?
        .trim();
    if holder.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "{SESSION_HEADER} header is required"
        )));
    }
    Ok(holder.to_string())
}

/// Standard `{ ok, status }` body for claim-shaped responses.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub status: &'static str,
}

impl StatusResponse {
    pub fn new(status: &'static str) -> Self {
        Self { ok: true, status }
    }
}
