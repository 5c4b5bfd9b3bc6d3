//! Route modules for Swarm Accelerator
//!
//! Only the chunk and manifest read paths plus the two upload endpoints are
//! handled here. Every other request, and every method a route does not
//! serve, is forwarded to the origin node.

pub mod bzz;
pub mod chunks;
pub mod stream;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let bulk_limit = state.config().stream.bulk_max_bytes;

    Router::new()
        .route(
            "/chunks/bulk-upload",
            post(chunks::bulk_upload)
                .fallback(forward)
                .layer(DefaultBodyLimit::max(bulk_limit)),
        )
        .route("/chunks/stream-turbo", get(stream::stream_turbo).fallback(forward))
        .route("/chunks/:hash", get(chunks::get_chunk).fallback(forward))
        .route("/bzz/*address", get(bzz::get_content).fallback(forward))
        .fallback(forward)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Relay anything not served locally
async fn forward(State(state): State<AppState>, request: Request) -> Response {
    state.gateway().forward(request).await
}
