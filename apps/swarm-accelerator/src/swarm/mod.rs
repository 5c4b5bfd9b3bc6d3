//! Swarm primitives
//!
//! Content hashes, chunks, postage identifiers and addresses, plus the BMT
//! chunk hasher used to verify uploads.

pub mod bmt;
mod chunk;
mod types;

pub use bmt::{hash_chunk, verify_chunk};
pub use chunk::{ChunkError, SwarmChunk};
pub use types::*;

// ============================================================================
// Constants
// ============================================================================

/// Size of a content hash in bytes
pub const HASH_SIZE: usize = 32;

/// Size of the little-endian span prefix in bytes
pub const SPAN_SIZE: usize = 8;

/// Maximum chunk data size in bytes
pub const CHUNK_SIZE: usize = 4096;

/// BMT segment size in bytes
pub const SEGMENT_SIZE: usize = 32;

/// Number of BMT leaf segments per chunk
pub const BRANCHES: usize = CHUNK_SIZE / SEGMENT_SIZE;
