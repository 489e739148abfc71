//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (intentionally unauthenticated for probes)
        .route("/v1/health", get(handlers::health_check))
        // Tile content and lifecycle
        .route(
            "/v1/tiles/{z}/{x}/{y}",
            get(handlers::get_tile).delete(handlers::delete_tile),
        )
        .route("/v1/tiles/{z}/{x}/{y}/claim", post(handlers::claim_tile))
        .route(
            "/v1/tiles/{z}/{x}/{y}/invalidate",
            post(handlers::invalidate_tile),
        )
        // Edit flow
        .route("/v1/tiles/{z}/{x}/{y}/edit", post(handlers::edit_preview))
        .route(
            "/v1/tiles/{z}/{x}/{y}/confirm",
            post(handlers::confirm_edit),
        )
        // Neighborhood generation locks
        .route(
            "/v1/locks/{z}/{x}/{y}",
            get(handlers::check_lock)
                .post(handlers::acquire_lock)
                .delete(handlers::release_lock),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
