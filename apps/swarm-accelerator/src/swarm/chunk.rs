//! Content-addressed chunk

use axum::body::Bytes;

use super::{bmt, SwarmHash, CHUNK_SIZE, SPAN_SIZE};

/// Errors building a chunk from raw bytes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("Chunk data too large: {0} bytes (max: 4096)")]
    DataTooLarge(usize),

    #[error("Chunk payload too short: {0} bytes (span alone is 8)")]
    PayloadTooShort(usize),
}

/// An immutable chunk: hash, span and data
///
/// Stored and transferred as `span || data`, which is kept contiguous so
/// serving a chunk never copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmChunk {
    hash: SwarmHash,
    span_and_data: Bytes,
}

impl SwarmChunk {
    /// Hash a `span || data` payload and build the chunk
    pub fn from_span_and_data(payload: impl Into<Bytes>) -> Result<Self, ChunkError> {
        let payload = payload.into();
        let (span, data) = split_payload(&payload)?;
        let hash = bmt::hash_chunk(&span, data)?;

        Ok(Self {
            hash,
            span_and_data: payload,
        })
    }

    /// Build from a payload whose hash is already known (e.g. read back from the store)
    ///
    /// The hash is trusted; only the payload shape is checked.
    pub fn with_hash(hash: SwarmHash, payload: impl Into<Bytes>) -> Result<Self, ChunkError> {
        let payload = payload.into();
        split_payload(&payload)?;

        Ok(Self {
            hash,
            span_and_data: payload,
        })
    }

    /// Build a chunk from separate span value and data
    pub fn new(span: u64, data: &[u8]) -> Result<Self, ChunkError> {
        if data.len() > CHUNK_SIZE {
            return Err(ChunkError::DataTooLarge(data.len()));
        }
        let mut payload = Vec::with_capacity(SPAN_SIZE + data.len());
        payload.extend_from_slice(&span.to_le_bytes());
        payload.extend_from_slice(data);
        Self::from_span_and_data(payload)
    }

    pub fn hash(&self) -> SwarmHash {
        self.hash
    }

    /// Logical length of the content this chunk represents
    pub fn span(&self) -> u64 {
        let mut span = [0u8; SPAN_SIZE];
        span.copy_from_slice(&self.span_and_data[..SPAN_SIZE]);
        u64::from_le_bytes(span)
    }

    pub fn data(&self) -> &[u8] {
        &self.span_and_data[SPAN_SIZE..]
    }

    /// Wire/storage encoding
    pub fn span_and_data(&self) -> &Bytes {
        &self.span_and_data
    }

    /// Recompute the hash and compare
    pub fn verify(&self) -> bool {
        let mut span = [0u8; SPAN_SIZE];
        span.copy_from_slice(&self.span_and_data[..SPAN_SIZE]);
        bmt::verify_chunk(&self.hash, &span, self.data())
    }
}

fn split_payload(payload: &[u8]) -> Result<([u8; SPAN_SIZE], &[u8]), ChunkError> {
    if payload.len() < SPAN_SIZE {
        return Err(ChunkError::PayloadTooShort(payload.len()));
    }
    let (span_bytes, data) = payload.split_at(SPAN_SIZE);
    if data.len() > CHUNK_SIZE {
        return Err(ChunkError::DataTooLarge(data.len()));
    }
    let mut span = [0u8; SPAN_SIZE];
    span.copy_from_slice(span_bytes);
    Ok((span, data))
}
