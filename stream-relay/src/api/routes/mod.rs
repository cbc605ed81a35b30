//! API route definitions.

pub mod health;
pub mod stream;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/ai/stream", stream::router())
        .nest("/health", health::router())
        .with_state(state)
}
