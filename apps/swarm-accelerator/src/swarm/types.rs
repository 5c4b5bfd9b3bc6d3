//! Swarm identifier types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::HASH_SIZE;

/// Errors raised when parsing identifiers from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid tag id: {0}")]
    InvalidTag(String),

    #[error("Empty address")]
    EmptyAddress,
}

fn decode_fixed(value: &str) -> Result<[u8; HASH_SIZE], ParseError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(trimmed).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    <[u8; HASH_SIZE]>::try_from(bytes.as_slice()).map_err(|_| ParseError::InvalidLength {
        expected: HASH_SIZE,
        actual: bytes.len(),
    })
}

// ============================================================================
// Swarm Hash
// ============================================================================

/// 32-byte content hash identifying a chunk
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwarmHash([u8; HASH_SIZE]);

impl SwarmHash {
    /// The all-zero hash, used by manifests to mark "no entry"
    pub const ZERO: SwarmHash = SwarmHash([0u8; HASH_SIZE]);

    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, failing unless it is exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        <[u8; HASH_SIZE]>::try_from(bytes)
            .map(Self)
            .map_err(|_| ParseError::InvalidLength {
                expected: HASH_SIZE,
                actual: bytes.len(),
            })
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }
}

impl FromStr for SwarmHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Self)
    }
}

impl fmt::Display for SwarmHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SwarmHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwarmHash({})", self)
    }
}

// ============================================================================
// Postage
// ============================================================================

/// Postage batch identifier attached to uploads
///
/// Opaque to the accelerator: it is recorded with each uploaded chunk and
/// handed to the origin when the chunk is propagated.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PostageBatchId([u8; HASH_SIZE]);

impl PostageBatchId {
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl FromStr for PostageBatchId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s.trim()).map(Self)
    }
}

impl fmt::Display for PostageBatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PostageBatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostageBatchId({})", self)
    }
}

/// Upload session tag, used only for origin-side bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagId(pub u64);

impl FromStr for TagId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TagId)
            .map_err(|_| ParseError::InvalidTag(s.to_string()))
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Uploaded Chunk Reference
// ============================================================================

/// A locally accepted chunk awaiting propagation to the origin network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedChunkRef {
    pub id: Uuid,
    pub hash: SwarmHash,
    pub batch_id: PostageBatchId,
    pub tag_id: Option<TagId>,
    pub created_at: DateTime<Utc>,
}

impl UploadedChunkRef {
    pub fn new(hash: SwarmHash, batch_id: PostageBatchId, tag_id: Option<TagId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hash,
            batch_id,
            tag_id,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Swarm Address
// ============================================================================

/// A resource inside a manifest: `{root_hash}[/{path}]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmAddress {
    pub root_hash: SwarmHash,
    pub path: String,
}

impl SwarmAddress {
    pub fn new(root_hash: SwarmHash, path: impl Into<String>) -> Self {
        Self {
            root_hash,
            path: path.into(),
        }
    }
}

impl FromStr for SwarmAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_start_matches('/');
        if s.is_empty() {
            return Err(ParseError::EmptyAddress);
        }

        let (root, path) = match s.split_once('/') {
            Some((root, path)) => (root, path),
            None => (s, ""),
        };

        Ok(Self {
            root_hash: root.parse()?,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for SwarmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.root_hash)
        } else {
            write!(f, "{}/{}", self.root_hash, self.path)
        }
    }
}
