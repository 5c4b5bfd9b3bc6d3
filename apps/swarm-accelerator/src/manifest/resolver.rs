//! Manifest path resolution

use std::collections::HashMap;

use crate::store::ChunkStore;
use crate::swarm::{SwarmAddress, SwarmHash};

use super::{ChunkReference, Joiner, MantarayNode, ResolveError, INDEX_DOCUMENT_KEY};

/// Upper bound on the joined size of a single manifest node
const MAX_NODE_SIZE: u64 = 4 * 1024 * 1024;

/// Resolves `{root}/{path}` addresses against manifests in the local store
#[derive(Clone)]
pub struct ManifestResolver {
    joiner: Joiner,
}

impl ManifestResolver {
    pub fn new(store: ChunkStore) -> Self {
        Self {
            joiner: Joiner::new(store),
        }
    }

    pub fn joiner(&self) -> &Joiner {
        &self.joiner
    }

    /// Resolve an address to the root chunk of its content plus metadata
    pub async fn resolve(&self, address: &SwarmAddress) -> Result<ChunkReference, ResolveError> {
        let root = self.load_node(address.root_hash).await?;
        let path = address.path.trim_start_matches('/');

        if path.is_empty() {
            let index = index_document(&root)
                .ok_or_else(|| ResolveError::NotFound("no index document".to_string()))?;
            return self.lookup(root, index.as_bytes()).await;
        }

        match self.lookup(root.clone(), path.as_bytes()).await {
            Err(ResolveError::NotFound(_)) if index_document(&root).is_some() => {
                // Directory paths are served through their own index document
                let index = index_document(&root).unwrap_or_default();
                let nested = format!("{}/{}", path.trim_end_matches('/'), index);
                tracing::debug!(path = %path, nested = %nested, "Retrying lookup with index document");
                self.lookup(root, nested.as_bytes())
                    .await
                    .map_err(|_| ResolveError::NotFound(path.to_string()))
            }
            other => other,
        }
    }

    async fn lookup(&self, mut node: MantarayNode, path: &[u8]) -> Result<ChunkReference, ResolveError> {
        let mut remaining = path;
        let mut metadata = HashMap::new();

        loop {
            if remaining.is_empty() {
                return match node.entry {
                    Some(hash) => Ok(ChunkReference { hash, metadata }),
                    None => Err(ResolveError::NotFound(String::from_utf8_lossy(path).into_owned())),
                };
            }

            let fork = node
                .fork_for(remaining)
                .ok_or_else(|| ResolveError::NotFound(String::from_utf8_lossy(path).into_owned()))?;

            remaining = &remaining[fork.prefix.len()..];
            metadata = fork.metadata.clone();
            let reference = fork.reference;
            node = self.load_node(reference).await?;
        }
    }

    async fn load_node(&self, hash: SwarmHash) -> Result<MantarayNode, ResolveError> {
        let content = self.joiner.join(hash).await?;
        if content.size() > MAX_NODE_SIZE {
            return Err(ResolveError::MalformedManifest(format!(
                "node {} declares {} bytes",
                hash,
                content.size()
            )));
        }
        MantarayNode::decode(&content.collect().await?)
    }
}

fn index_document(root: &MantarayNode) -> Option<String> {
    root.fork_for(b"/")
        .filter(|fork| fork.prefix == b"/")
        .and_then(|fork| fork.metadata.get(INDEX_DOCUMENT_KEY))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::joiner::tests::{store_content, test_store};
    use crate::manifest::node::NODE_TYPE_VALUE;
    use crate::manifest::Fork;
    use std::collections::BTreeMap;

    async fn put_node(store: &ChunkStore, node: &MantarayNode) -> SwarmHash {
        store_content(store, &node.encode().unwrap()).await
    }

    fn fork_to(prefix: &str, reference: SwarmHash, metadata: &[(&str, &str)]) -> Fork {
        Fork {
            prefix: prefix.as_bytes().to_vec(),
            node_type: NODE_TYPE_VALUE,
            reference,
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn leaf(entry: SwarmHash) -> MantarayNode {
        MantarayNode {
            entry: Some(entry),
            forks: BTreeMap::new(),
        }
    }

    /// Root with `index.html`, `docs/` + `docs/index.html`, and a `/` index fork
    async fn site(store: &ChunkStore) -> (SwarmHash, SwarmHash, SwarmHash) {
        let index_content = store_content(store, b"<h1>home</h1>").await;
        let docs_content = store_content(store, b"<h1>docs</h1>").await;

        let index_leaf = put_node(store, &leaf(index_content)).await;
        let docs_leaf = put_node(store, &leaf(docs_content)).await;

        let mut docs = MantarayNode::default();
        docs.forks.insert(
            b'i',
            fork_to("index.html", docs_leaf, &[("Content-Type", "text/html"), ("Filename", "index.html")]),
        );
        let docs = put_node(store, &docs).await;

        let slash = put_node(store, &MantarayNode::default()).await;

        let mut root = MantarayNode::default();
        root.forks.insert(
            b'i',
            fork_to(
                "index.html",
                index_leaf,
                &[("Content-Type", "text/html; charset=utf-8"), ("Filename", "index.html")],
            ),
        );
        root.forks.insert(b'd', fork_to("docs/", docs, &[]));
        root.forks.insert(b'/', fork_to("/", slash, &[("website-index-document", "index.html")]));

        (put_node(store, &root).await, index_content, docs_content)
    }

    #[tokio::test]
    async fn test_resolve_path_returns_metadata() {
        let (store, _dir) = test_store().await;
        let (root, index_content, _) = site(&store).await;
        let resolver = ManifestResolver::new(store);

        let reference = resolver
            .resolve(&SwarmAddress::new(root, "index.html"))
            .await
            .unwrap();

        assert_eq!(reference.hash, index_content);
        assert_eq!(reference.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(reference.file_name(), Some("index.html"));
    }

    #[tokio::test]
    async fn test_empty_path_uses_index_document() {
        let (store, _dir) = test_store().await;
        let (root, index_content, _) = site(&store).await;
        let resolver = ManifestResolver::new(store);

        for path in ["", "/"] {
            let reference = resolver.resolve(&SwarmAddress::new(root, path)).await.unwrap();
            assert_eq!(reference.hash, index_content);
        }
    }

    #[tokio::test]
    async fn test_directory_path_uses_nested_index() {
        let (store, _dir) = test_store().await;
        let (root, _, docs_content) = site(&store).await;
        let resolver = ManifestResolver::new(store);

        let reference = resolver.resolve(&SwarmAddress::new(root, "docs/")).await.unwrap();
        assert_eq!(reference.hash, docs_content);
    }

    #[tokio::test]
    async fn test_unknown_path_not_found() {
        let (store, _dir) = test_store().await;
        let (root, _, _) = site(&store).await;
        let resolver = ManifestResolver::new(store);

        for path in ["missing.css", "index.htm", "docs/other.html"] {
            let result = resolver.resolve(&SwarmAddress::new(root, path)).await;
            assert!(matches!(result, Err(ResolveError::NotFound(_))), "path {}", path);
        }
    }

    #[tokio::test]
    async fn test_root_without_children_not_found() {
        let (store, _dir) = test_store().await;
        let root = put_node(&store, &MantarayNode::default()).await;
        let resolver = ManifestResolver::new(store);

        let result = resolver.resolve(&SwarmAddress::new(root, "/")).await;
        assert!(matches!(result, Err(ResolveError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_root_is_miss() {
        let (store, _dir) = test_store().await;
        let resolver = ManifestResolver::new(store);

        let result = resolver
            .resolve(&SwarmAddress::new(SwarmHash::from_bytes([4u8; 32]), "a"))
            .await;
        assert!(matches!(result, Err(ResolveError::Miss(_))));
    }

    #[tokio::test]
    async fn test_non_manifest_root_is_malformed() {
        let (store, _dir) = test_store().await;
        let root = store_content(&store, &[7u8; 200]).await;
        let resolver = ManifestResolver::new(store);

        let result = resolver.resolve(&SwarmAddress::new(root, "a")).await;
        assert!(matches!(result, Err(ResolveError::MalformedManifest(_))));
    }
}
