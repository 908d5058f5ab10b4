//! HTTP API handlers and routing.

pub mod error;
mod health;
mod keys;
pub mod request_context;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .merge(health::routes())
        // API v1 routes
        .nest("/v1", keys::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
