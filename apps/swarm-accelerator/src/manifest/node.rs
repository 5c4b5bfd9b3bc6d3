//! Mantaray manifest node (v0.2)
//!
//! Serialized layout:
//!
//! ```text
//! obfuscation key   32 bytes
//! version hash      31 bytes   keccak256("mantaray:0.2")[..31]
//! ref size           1 byte    0, 32 or 64
//! entry       ref size bytes
//! fork index        32 bytes   bitmap over the first byte of each fork prefix
//! forks             per set bit, ascending:
//!     node type      1 byte
//!     prefix length  1 byte
//!     prefix        30 bytes   zero padded
//!     reference ref size bytes
//!     [metadata size 2 bytes BE, metadata JSON]  when node type has METADATA
//! ```
//!
//! Everything after the obfuscation key is XORed with it.

use std::collections::{BTreeMap, HashMap};

use sha3::{Digest, Keccak256};

use crate::swarm::{SwarmHash, HASH_SIZE};

use super::ResolveError;

pub const NODE_TYPE_VALUE: u8 = 2;
pub const NODE_TYPE_EDGE: u8 = 4;
pub const NODE_TYPE_PATH_SEPARATOR: u8 = 8;
pub const NODE_TYPE_METADATA: u8 = 16;

const VERSION_LABEL: &[u8] = b"mantaray:0.2";
const VERSION_HASH_SIZE: usize = 31;
const PREFIX_MAX_SIZE: usize = 30;
const FORK_HEADER_SIZE: usize = 2 + PREFIX_MAX_SIZE;
const INDEX_SIZE: usize = 32;
const HEADER_SIZE: usize = HASH_SIZE + VERSION_HASH_SIZE + 1;

fn version_hash() -> [u8; VERSION_HASH_SIZE] {
    let digest = Keccak256::digest(VERSION_LABEL);
    let mut out = [0u8; VERSION_HASH_SIZE];
    out.copy_from_slice(&digest[..VERSION_HASH_SIZE]);
    out
}

/// An edge to a child node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fork {
    pub prefix: Vec<u8>,
    /// Type flags of the child node
    pub node_type: u8,
    pub reference: SwarmHash,
    pub metadata: HashMap<String, String>,
}

/// A decoded manifest node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MantarayNode {
    pub entry: Option<SwarmHash>,
    /// Forks keyed by the first byte of their prefix
    pub forks: BTreeMap<u8, Fork>,
}

impl MantarayNode {
    pub fn decode(bytes: &[u8]) -> Result<Self, ResolveError> {
        if bytes.len() < HEADER_SIZE {
            return Err(malformed(format!("node is {} bytes, shorter than its header", bytes.len())));
        }

        let mut data = bytes.to_vec();
        let (key, body) = data.split_at_mut(HASH_SIZE);
        if key.iter().any(|b| *b != 0) {
            for (i, b) in body.iter_mut().enumerate() {
                *b ^= key[i % HASH_SIZE];
            }
        }

        let mut cursor = Cursor::new(&data[HASH_SIZE..]);

        if cursor.take(VERSION_HASH_SIZE)? != version_hash() {
            return Err(malformed("unknown manifest version".to_string()));
        }

        let ref_size = cursor.take(1)?[0] as usize;
        match ref_size {
            0 | HASH_SIZE => {}
            64 => return Err(ResolveError::Unsupported("encrypted manifest reference".to_string())),
            other => return Err(malformed(format!("invalid reference size {}", other))),
        }

        let entry = match cursor.take(ref_size)? {
            [] => None,
            raw => Some(SwarmHash::from_slice(raw).map_err(|e| malformed(e.to_string()))?)
                .filter(|hash| !hash.is_zero()),
        };

        let mut forks = BTreeMap::new();
        if cursor.remaining() == 0 {
            return Ok(Self { entry, forks });
        }

        let mut index = [0u8; INDEX_SIZE];
        index.copy_from_slice(cursor.take(INDEX_SIZE)?);

        for byte in 0..=u8::MAX {
            if index[byte as usize / 8] & (1 << (byte % 8)) == 0 {
                continue;
            }
            if ref_size == 0 {
                return Err(malformed("fork present on a node without references".to_string()));
            }
            let fork = decode_fork(&mut cursor, ref_size)?;
            forks.insert(byte, fork);
        }

        Ok(Self { entry, forks })
    }

    /// Serialize without obfuscation
    ///
    /// Produces nodes that `decode` accepts; used to build manifests for
    /// tests and tooling. Fork prefixes must be 1 to 30 bytes and metadata
    /// must serialize to at most 65535 bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ResolveError> {
        let mut out = Vec::with_capacity(HEADER_SIZE + HASH_SIZE + INDEX_SIZE);
        out.extend_from_slice(&[0u8; HASH_SIZE]);
        out.extend_from_slice(&version_hash());
        out.push(HASH_SIZE as u8);
        out.extend_from_slice(self.entry.unwrap_or(SwarmHash::ZERO).as_bytes());

        let mut index = [0u8; INDEX_SIZE];
        for byte in self.forks.keys() {
            index[*byte as usize / 8] |= 1 << (byte % 8);
        }
        out.extend_from_slice(&index);

        for fork in self.forks.values() {
            let mut node_type = fork.node_type;
            if !fork.metadata.is_empty() {
                node_type |= NODE_TYPE_METADATA;
            }
            if fork.prefix.is_empty() || fork.prefix.len() > PREFIX_MAX_SIZE {
                return Err(malformed(format!(
                    "fork prefix of {} bytes, expected 1 to {}",
                    fork.prefix.len(),
                    PREFIX_MAX_SIZE
                )));
            }
            out.push(node_type);
            out.push(fork.prefix.len() as u8);
            let mut prefix = [0u8; PREFIX_MAX_SIZE];
            prefix[..fork.prefix.len()].copy_from_slice(&fork.prefix);
            out.extend_from_slice(&prefix);
            out.extend_from_slice(fork.reference.as_bytes());

            if !fork.metadata.is_empty() {
                let json = serde_json::to_vec(&fork.metadata)
                    .map_err(|e| malformed(format!("fork metadata: {}", e)))?;
                let len = u16::try_from(json.len())
                    .map_err(|_| malformed(format!("fork metadata of {} bytes", json.len())))?;
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(&json);
            }
        }

        Ok(out)
    }

    /// Fork whose prefix starts the given path
    pub fn fork_for(&self, path: &[u8]) -> Option<&Fork> {
        let first = path.first()?;
        self.forks
            .get(first)
            .filter(|fork| path.starts_with(&fork.prefix))
    }
}

fn decode_fork(cursor: &mut Cursor<'_>, ref_size: usize) -> Result<Fork, ResolveError> {
    let header = cursor.take(FORK_HEADER_SIZE)?;
    let node_type = header[0];
    let prefix_len = header[1] as usize;
    if prefix_len == 0 || prefix_len > PREFIX_MAX_SIZE {
        return Err(malformed(format!("invalid fork prefix length {}", prefix_len)));
    }
    let prefix = header[2..2 + prefix_len].to_vec();

    let reference = SwarmHash::from_slice(cursor.take(ref_size)?).map_err(|e| malformed(e.to_string()))?;

    let metadata = if node_type & NODE_TYPE_METADATA != 0 {
        let size = cursor.take(2)?;
        let size = u16::from_be_bytes([size[0], size[1]]) as usize;
        let raw = cursor.take(size)?;
        serde_json::from_slice::<HashMap<String, String>>(raw)
            .map_err(|e| malformed(format!("fork metadata: {}", e)))?
    } else {
        HashMap::new()
    };

    Ok(Fork {
        prefix,
        node_type,
        reference,
        metadata,
    })
}

fn malformed(reason: String) -> ResolveError {
    ResolveError::MalformedManifest(reason)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ResolveError> {
        if self.remaining() < n {
            return Err(malformed(format!(
                "node truncated: needed {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fork(prefix: &str, reference: u8, metadata: &[(&str, &str)]) -> Fork {
        Fork {
            prefix: prefix.as_bytes().to_vec(),
            node_type: NODE_TYPE_VALUE,
            reference: SwarmHash::from_bytes([reference; 32]),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn sample_node() -> MantarayNode {
        let mut node = MantarayNode::default();
        node.forks.insert(b'a', fork("about.html", 1, &[("Content-Type", "text/html")]));
        node.forks.insert(b'i', fork("img/", 2, &[]));
        node.forks.insert(b'/', fork("/", 3, &[("website-index-document", "index.html")]));
        node
    }

    #[test]
    fn test_decode_encoded_node() {
        let node = sample_node();
        let decoded = MantarayNode::decode(&node.encode().unwrap()).unwrap();

        assert_eq!(decoded.entry, None);
        assert_eq!(decoded.forks.len(), 3);
        let about = &decoded.forks[&b'a'];
        assert_eq!(about.prefix, b"about.html");
        assert_eq!(about.metadata["Content-Type"], "text/html");
        assert!(about.node_type & NODE_TYPE_METADATA != 0);
        assert!(decoded.forks[&b'i'].metadata.is_empty());
    }

    #[test]
    fn test_obfuscated_node() {
        let mut bytes = sample_node().encode().unwrap();
        let key: Vec<u8> = (1..=32).collect();
        for (i, b) in bytes[HASH_SIZE..].iter_mut().enumerate() {
            *b ^= key[i % HASH_SIZE];
        }
        bytes[..HASH_SIZE].copy_from_slice(&key);

        assert_eq!(MantarayNode::decode(&bytes).unwrap(), sample_node());
    }

    #[test]
    fn test_entry_round_trip() {
        let node = MantarayNode {
            entry: Some(SwarmHash::from_bytes([9u8; 32])),
            forks: BTreeMap::new(),
        };
        assert_eq!(MantarayNode::decode(&node.encode().unwrap()).unwrap(), node);
    }

    #[test]
    fn test_fork_for_requires_full_prefix() {
        let node = sample_node();
        assert!(node.fork_for(b"about.html").is_some());
        assert!(node.fork_for(b"img/cat.png").is_some());
        assert!(node.fork_for(b"abo").is_none());
        assert!(node.fork_for(b"zzz").is_none());
        assert!(node.fork_for(b"").is_none());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut bytes = sample_node().encode().unwrap();
        bytes[HASH_SIZE] ^= 0xff;
        assert!(matches!(
            MantarayNode::decode(&bytes),
            Err(ResolveError::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_truncated_node_rejected() {
        let bytes = sample_node().encode().unwrap();
        assert!(matches!(
            MantarayNode::decode(&bytes[..bytes.len() - 5]),
            Err(ResolveError::MalformedManifest(_))
        ));
        assert!(matches!(
            MantarayNode::decode(&bytes[..10]),
            Err(ResolveError::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_encrypted_reference_unsupported() {
        let mut bytes = sample_node().encode().unwrap();
        bytes[HEADER_SIZE - 1] = 64;
        assert!(matches!(
            MantarayNode::decode(&bytes),
            Err(ResolveError::Unsupported(_))
        ));
    }

    #[test]
    fn test_encode_rejects_bad_prefix() {
        let mut node = MantarayNode::default();
        node.forks.insert(b'x', fork(&"x".repeat(PREFIX_MAX_SIZE + 1), 1, &[]));
        assert!(matches!(node.encode(), Err(ResolveError::MalformedManifest(_))));

        let mut node = MantarayNode::default();
        node.forks.insert(b'x', fork("", 1, &[]));
        assert!(matches!(node.encode(), Err(ResolveError::MalformedManifest(_))));

        let mut node = MantarayNode::default();
        node.forks.insert(b'x', fork(&"x".repeat(PREFIX_MAX_SIZE), 1, &[]));
        assert!(node.encode().is_ok());
    }
}
