//! Chunk upload pipeline
//!
//! Shared by the bulk and stream endpoints: verify the frame, store the
//! chunk, then record it for propagation.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};

use crate::protocol::{Frame, ProtocolError};
use crate::queue::ChunkPushQueue;
use crate::store::{ChunkStore, StoreError};
use crate::swarm::{ChunkError, PostageBatchId, SwarmChunk, SwarmHash, TagId, UploadedChunkRef};

pub const POSTAGE_BATCH_HEADER: &str = "swarm-postage-batch-id";
pub const TAG_HEADER: &str = "swarm-tag";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("Chunk hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: SwarmHash, actual: SwarmHash },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid chunk: {0}")]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingHeader(_) => StatusCode::BAD_REQUEST,
            Self::InvalidHeader { .. } => StatusCode::BAD_REQUEST,
            Self::HashMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Chunk(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Caused by the client's input rather than by the server
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Per-request upload parameters taken from the Swarm headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadContext {
    pub batch_id: PostageBatchId,
    pub tag_id: Option<TagId>,
}

impl UploadContext {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, UploadError> {
        let batch_id = header_str(headers, POSTAGE_BATCH_HEADER)?
            .ok_or(UploadError::MissingHeader(POSTAGE_BATCH_HEADER))?
            .parse::<PostageBatchId>()
            .map_err(|e: crate::swarm::ParseError| UploadError::InvalidHeader {
                name: POSTAGE_BATCH_HEADER,
                reason: e.to_string(),
            })?;

        let tag_id = header_str(headers, TAG_HEADER)?
            .map(|value| {
                value.parse::<TagId>().map_err(|e: crate::swarm::ParseError| UploadError::InvalidHeader {
                    name: TAG_HEADER,
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self { batch_id, tag_id })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, UploadError> {
    headers
        .get(name)
        .map(|value| {
            value.to_str().map_err(|e| UploadError::InvalidHeader {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Verify, store and enqueue uploaded chunks
#[derive(Clone)]
pub struct ChunkUploader {
    store: ChunkStore,
    queue: Arc<dyn ChunkPushQueue>,
}

impl ChunkUploader {
    pub fn new(store: ChunkStore, queue: Arc<dyn ChunkPushQueue>) -> Self {
        Self { store, queue }
    }

    /// Accept one decoded frame
    ///
    /// Returns once the chunk is durably stored. Enqueueing for propagation
    /// is best-effort and its failure does not fail the upload.
    pub async fn accept(&self, frame: Frame, context: &UploadContext) -> Result<SwarmChunk, UploadError> {
        let chunk = SwarmChunk::from_span_and_data(frame.payload)?;

        if let Some(expected) = frame.expected_hash {
            if expected != chunk.hash() {
                return Err(UploadError::HashMismatch {
                    expected,
                    actual: chunk.hash(),
                });
            }
        }

        self.store.put(&chunk).await?;

        let chunk_ref = UploadedChunkRef::new(chunk.hash(), context.batch_id, context.tag_id);
        if let Err(e) = self.queue.enqueue(chunk_ref).await {
            tracing::warn!(hash = %chunk.hash(), error = %e, "Failed to enqueue uploaded chunk");
        }

        Ok(chunk)
    }
}
