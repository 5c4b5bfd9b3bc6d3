//! Chunk tree joiner
//!
//! Content larger than one chunk is stored as a tree: intermediate chunks
//! carry the concatenated 32-byte references of their children and a span
//! equal to the size of the whole subtree. Leaves carry the content itself.

use axum::body::Bytes;
use futures::{Stream, TryStreamExt};

use crate::store::ChunkStore;
use crate::swarm::{SwarmChunk, SwarmHash, BRANCHES, CHUNK_SIZE, HASH_SIZE};

use super::ResolveError;

/// Builds joined views over chunk trees held in the local store
#[derive(Clone)]
pub struct Joiner {
    store: ChunkStore,
}

impl Joiner {
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }

    /// Fetch the root chunk of a tree
    ///
    /// Only the root is loaded here; the rest is fetched as the content is
    /// consumed.
    pub async fn join(&self, root: SwarmHash) -> Result<JoinedContent, ResolveError> {
        let chunk = fetch(&self.store, root).await?;
        Ok(JoinedContent {
            store: self.store.clone(),
            root: chunk,
        })
    }

    /// Fetch and concatenate a whole tree
    pub async fn join_all(&self, root: SwarmHash) -> Result<Bytes, ResolveError> {
        self.join(root).await?.collect().await
    }
}

/// A chunk tree whose root has been loaded
pub struct JoinedContent {
    store: ChunkStore,
    root: SwarmChunk,
}

enum Pending {
    Loaded(SwarmChunk),
    /// Child reference and the subtree size its parent assigns to it
    Reference(SwarmHash, u64),
}

impl JoinedContent {
    /// Total content length, from the root span
    pub fn size(&self) -> u64 {
        self.root.span()
    }

    pub fn root_hash(&self) -> SwarmHash {
        self.root.hash()
    }

    /// Stream the content leaf by leaf, in order
    ///
    /// Each yielded item is one leaf's data. Chunks are fetched depth-first
    /// as the stream is polled, so memory stays bounded by the tree depth.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, ResolveError>> + Send + 'static {
        let state = (self.store, vec![Pending::Loaded(self.root)]);

        futures::stream::try_unfold(state, |(store, mut stack)| async move {
            while let Some(pending) = stack.pop() {
                let chunk = match pending {
                    Pending::Loaded(chunk) => chunk,
                    Pending::Reference(hash, expected) => {
                        let chunk = fetch(&store, hash).await?;
                        if chunk.span() != expected {
                            return Err(ResolveError::MalformedChunk {
                                hash,
                                reason: format!("span {} where parent expects {}", chunk.span(), expected),
                            });
                        }
                        chunk
                    }
                };

                match expand(&chunk)? {
                    Node::Leaf(data) => return Ok(Some((data, (store, stack)))),
                    Node::Intermediate(children) => {
                        stack.extend(
                            children
                                .into_iter()
                                .rev()
                                .map(|(hash, span)| Pending::Reference(hash, span)),
                        );
                    }
                }
            }
            Ok::<_, ResolveError>(None)
        })
    }

    /// Buffer the whole content
    pub async fn collect(self) -> Result<Bytes, ResolveError> {
        let size = self.size();
        let mut out = Vec::with_capacity(usize::try_from(size).unwrap_or(0).min(64 * 1024 * 1024));
        let mut stream = Box::pin(self.into_stream());
        while let Some(piece) = stream.try_next().await? {
            out.extend_from_slice(&piece);
        }

        if out.len() as u64 != size {
            return Err(ResolveError::MalformedManifest(format!(
                "joined {} bytes, root span is {}",
                out.len(),
                size
            )));
        }
        Ok(Bytes::from(out))
    }
}

enum Node {
    Leaf(Bytes),
    /// Children in order, each with the span of its subtree
    Intermediate(Vec<(SwarmHash, u64)>),
}

fn expand(chunk: &SwarmChunk) -> Result<Node, ResolveError> {
    let span = chunk.span();
    let data = chunk.data();

    if span <= CHUNK_SIZE as u64 {
        let len = span as usize;
        if data.len() < len {
            return Err(ResolveError::MalformedChunk {
                hash: chunk.hash(),
                reason: format!("span {} exceeds data length {}", span, data.len()),
            });
        }
        let start = crate::swarm::SPAN_SIZE;
        return Ok(Node::Leaf(chunk.span_and_data().slice(start..start + len)));
    }

    if data.is_empty() || data.len() % HASH_SIZE != 0 {
        return Err(ResolveError::MalformedChunk {
            hash: chunk.hash(),
            reason: format!("intermediate chunk data length {} is not a multiple of 32", data.len()),
        });
    }

    let per_child = subtree_span(span);
    let expected = span.div_ceil(per_child);
    let count = (data.len() / HASH_SIZE) as u64;
    if count != expected {
        return Err(ResolveError::MalformedChunk {
            hash: chunk.hash(),
            reason: format!("span {} needs {} children, found {}", span, expected, count),
        });
    }

    let mut remaining = span;
    let mut children = Vec::with_capacity(data.len() / HASH_SIZE);
    for reference in data.chunks_exact(HASH_SIZE) {
        let hash = SwarmHash::from_slice(reference).map_err(|e| ResolveError::MalformedChunk {
            hash: chunk.hash(),
            reason: e.to_string(),
        })?;
        let child_span = remaining.min(per_child);
        remaining -= child_span;
        children.push((hash, child_span));
    }

    Ok(Node::Intermediate(children))
}

/// Size covered by each full child of an intermediate chunk with this span
///
/// Every child but the last covers `CHUNK_SIZE * BRANCHES^k` bytes, for the
/// smallest `k` at which `BRANCHES` children hold the whole span.
fn subtree_span(span: u64) -> u64 {
    let mut per_child = CHUNK_SIZE as u64;
    while let Some(next) = per_child.checked_mul(BRANCHES as u64) {
        if next >= span {
            break;
        }
        per_child = next;
    }
    per_child
}

async fn fetch(store: &ChunkStore, hash: SwarmHash) -> Result<SwarmChunk, ResolveError> {
    store.get(&hash).await?.ok_or(ResolveError::Miss(hash))
}
