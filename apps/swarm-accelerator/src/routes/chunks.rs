//! Chunk routes
//!
//! Endpoints:
//! - GET /chunks/:hash - Serve a cached chunk, forward on miss
//! - POST /chunks/bulk-upload - Store a batch of hash-checked chunks

use axum::{
    body::{Body, Bytes},
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::Result;
use crate::protocol::{FrameDecoder, FrameLayout};
use crate::state::AppState;
use crate::swarm::SwarmChunk;
use crate::upload::{UploadContext, UploadError};

/// GET /chunks/:hash
///
/// A hit returns the chunk's `span || data`. Misses and unparseable hashes
/// are forwarded to the origin as received.
pub async fn get_chunk(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    request: Request,
) -> Response {
    let gateway = state.gateway();
    let outcome = gateway.local_chunk(&hash).await;
    gateway.respond(outcome, request, chunk_response).await
}

fn chunk_response(chunk: SwarmChunk) -> Response {
    tracing::debug!(hash = %chunk.hash(), "Serving cached chunk");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", chunk.hash()),
            ),
        ],
        Body::from(chunk.span_and_data().clone()),
    )
        .into_response()
}

/// POST /chunks/bulk-upload
///
/// Body: `[u16 LE size][size bytes][32-byte hash]` repeated. Chunks are
/// committed one by one, so a failure part-way leaves the earlier ones
/// stored.
pub async fn bulk_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let context = UploadContext::from_headers(&headers)?;

    let mut decoder = FrameDecoder::new(FrameLayout::ONE_SHOT, body.len());
    decoder.feed(&body).map_err(UploadError::from)?;

    let uploader = state.uploader();
    let mut stored = 0usize;
    for frame in decoder.frames() {
        let frame = frame.map_err(UploadError::from)?;
        uploader.accept(frame, &context).await?;
        stored += 1;
    }
    decoder.finish().map_err(UploadError::from)?;

    tracing::info!(
        chunks = stored,
        bytes = body.len(),
        batch = %context.batch_id,
        "Bulk upload stored"
    );

    Ok(StatusCode::CREATED)
}
