//! Manifest resolution and content joining
//!
//! - `joiner`: reassembles a chunk tree into a byte stream
//! - `node`: Mantaray manifest node format
//! - `resolver`: walks a manifest to find the resource behind a path

pub mod joiner;
pub mod node;
pub mod resolver;

use std::collections::HashMap;

use crate::store::StoreError;
use crate::swarm::SwarmHash;

pub use joiner::{JoinedContent, Joiner};
pub use node::{Fork, MantarayNode};
pub use resolver::ManifestResolver;

/// Metadata key holding a resource's content type
pub const CONTENT_TYPE_KEY: &str = "Content-Type";

/// Metadata key holding a resource's file name
pub const FILENAME_KEY: &str = "Filename";

/// Root metadata key naming the document served for an empty path
pub const INDEX_DOCUMENT_KEY: &str = "website-index-document";

/// Resolution and joining errors
///
/// Every variant makes a read fall back to the origin.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Path not found in manifest: {0}")]
    NotFound(String),

    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Malformed chunk {hash}: {reason}")]
    MalformedChunk { hash: SwarmHash, reason: String },

    #[error("Unsupported reference: {0}")]
    Unsupported(String),

    #[error("Chunk not available locally: {0}")]
    Miss(SwarmHash),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The resource a manifest path resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReference {
    /// Root chunk of the resource content
    pub hash: SwarmHash,
    pub metadata: HashMap<String, String>,
}

impl ChunkReference {
    pub fn content_type(&self) -> Option<&str> {
        self.metadata.get(CONTENT_TYPE_KEY).map(String::as_str)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.metadata.get(FILENAME_KEY).map(String::as_str)
    }
}
