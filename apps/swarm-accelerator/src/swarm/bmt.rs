//! Binary Merkle Tree chunk hashing
//!
//! A chunk address is `keccak256(span || bmt_root(data))`, where the BMT root
//! is computed over the data zero-padded to [`CHUNK_SIZE`] bytes and split
//! into [`BRANCHES`] segments of [`SEGMENT_SIZE`] bytes.

use sha3::{Digest, Keccak256};

use super::chunk::ChunkError;
use super::{SwarmHash, BRANCHES, CHUNK_SIZE, SEGMENT_SIZE, SPAN_SIZE};

/// Compute the content hash of a chunk from its span and data
pub fn hash_chunk(span: &[u8; SPAN_SIZE], data: &[u8]) -> Result<SwarmHash, ChunkError> {
    if data.len() > CHUNK_SIZE {
        return Err(ChunkError::DataTooLarge(data.len()));
    }

    let root = bmt_root(data);

    let mut hasher = Keccak256::new();
    hasher.update(span);
    hasher.update(root);
    Ok(SwarmHash::from_bytes(hasher.finalize().into()))
}

/// Check that `claimed` is the content hash of `span || data`
///
/// Oversized data never verifies.
pub fn verify_chunk(claimed: &SwarmHash, span: &[u8; SPAN_SIZE], data: &[u8]) -> bool {
    match hash_chunk(span, data) {
        Ok(hash) => &hash == claimed,
        Err(_) => false,
    }
}

fn bmt_root(data: &[u8]) -> [u8; SEGMENT_SIZE] {
    let mut level = vec![0u8; CHUNK_SIZE];
    level[..data.len()].copy_from_slice(data);

    // Each pass halves the level in place: 128 -> 64 -> ... -> 1 segments.
    let mut segments = BRANCHES;
    while segments > 1 {
        for i in 0..segments / 2 {
            let pair = &level[i * 2 * SEGMENT_SIZE..(i + 1) * 2 * SEGMENT_SIZE];
            let digest: [u8; SEGMENT_SIZE] = Keccak256::digest(pair).into();
            level[i * SEGMENT_SIZE..(i + 1) * SEGMENT_SIZE].copy_from_slice(&digest);
        }
        segments /= 2;
    }

    let mut root = [0u8; SEGMENT_SIZE];
    root.copy_from_slice(&level[..SEGMENT_SIZE]);
    root
}
