//! Acceleration gateway
//!
//! Every read route makes a local attempt first. Whatever the attempt
//! produces is either a hit, answered from the local store, or a fallback
//! reason, in which case the original request goes to the origin untouched.

use std::fmt;

use axum::body::Bytes;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::manifest::{ChunkReference, JoinedContent, ManifestResolver, ResolveError};
use crate::proxy::OriginForwarder;
use crate::store::{ChunkStore, StoreError};
use crate::swarm::{ParseError, SwarmAddress, SwarmChunk, SwarmHash};

/// Result of a local attempt
pub enum LocalOutcome<T> {
    Hit(T),
    Fallback(FallbackReason),
}

/// Why a request is handed to the origin
#[derive(Debug)]
pub enum FallbackReason {
    InvalidParameter(ParseError),
    Miss(SwarmHash),
    Resolve(ResolveError),
    Store(StoreError),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::InvalidParameter(e) => write!(f, "invalid parameter: {}", e),
            FallbackReason::Miss(hash) => write!(f, "chunk {} not cached", hash),
            FallbackReason::Resolve(e) => write!(f, "resolution failed: {}", e),
            FallbackReason::Store(e) => write!(f, "store failure: {}", e),
        }
    }
}

/// Content resolved from a manifest
pub struct LocalContent {
    pub reference: ChunkReference,
    pub body: ContentBody,
}

pub enum ContentBody {
    /// Fully joined ahead of the response
    Buffered(Bytes),
    /// Root resolved; remaining chunks are fetched while responding
    Streamed(JoinedContent),
}

impl ContentBody {
    pub fn len(&self) -> u64 {
        match self {
            ContentBody::Buffered(bytes) => bytes.len() as u64,
            ContentBody::Streamed(content) => content.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct AccelerationGateway {
    store: ChunkStore,
    resolver: ManifestResolver,
    forwarder: OriginForwarder,
    join_buffer_limit: u64,
}

impl AccelerationGateway {
    pub fn new(store: ChunkStore, forwarder: OriginForwarder, join_buffer_limit: u64) -> Self {
        Self {
            resolver: ManifestResolver::new(store.clone()),
            store,
            forwarder,
            join_buffer_limit,
        }
    }

    pub fn forwarder(&self) -> &OriginForwarder {
        &self.forwarder
    }

    /// Look up a single chunk by its textual hash
    pub async fn local_chunk(&self, raw_hash: &str) -> LocalOutcome<SwarmChunk> {
        let hash = match raw_hash.parse::<SwarmHash>() {
            Ok(hash) => hash,
            Err(e) => return LocalOutcome::Fallback(FallbackReason::InvalidParameter(e)),
        };

        match self.store.get(&hash).await {
            Ok(Some(chunk)) => LocalOutcome::Hit(chunk),
            Ok(None) => LocalOutcome::Fallback(FallbackReason::Miss(hash)),
            Err(e) => LocalOutcome::Fallback(FallbackReason::Store(e)),
        }
    }

    /// Resolve `{root}[/{path}]` and join its content
    ///
    /// Content within the join buffer limit is joined completely here, so any
    /// missing chunk still turns into a fallback. Larger content is only
    /// resolved down to its root chunk.
    pub async fn local_content(&self, raw_address: &str) -> LocalOutcome<LocalContent> {
        let address = match raw_address.parse::<SwarmAddress>() {
            Ok(address) => address,
            Err(e) => return LocalOutcome::Fallback(FallbackReason::InvalidParameter(e)),
        };

        match self.resolve_content(&address).await {
            Ok(content) => LocalOutcome::Hit(content),
            Err(ResolveError::Store(e)) => LocalOutcome::Fallback(FallbackReason::Store(e)),
            Err(ResolveError::Miss(hash)) => LocalOutcome::Fallback(FallbackReason::Miss(hash)),
            Err(e) => LocalOutcome::Fallback(FallbackReason::Resolve(e)),
        }
    }

    async fn resolve_content(&self, address: &SwarmAddress) -> Result<LocalContent, ResolveError> {
        let reference = self.resolver.resolve(address).await?;
        let joined = self.resolver.joiner().join(reference.hash).await?;

        let body = if joined.size() <= self.join_buffer_limit {
            ContentBody::Buffered(joined.collect().await?)
        } else {
            ContentBody::Streamed(joined)
        };

        Ok(LocalContent { reference, body })
    }

    /// Answer from a hit, or forward the original request
    pub async fn respond<T, F>(&self, outcome: LocalOutcome<T>, request: Request, render: F) -> Response
    where
        F: FnOnce(T) -> Response,
    {
        match outcome {
            LocalOutcome::Hit(value) => render(value),
            LocalOutcome::Fallback(reason) => {
                match &reason {
                    FallbackReason::Store(_) => {
                        tracing::error!(path = %request.uri().path(), reason = %reason, "Falling back to origin")
                    }
                    _ => tracing::debug!(path = %request.uri().path(), reason = %reason, "Falling back to origin"),
                }
                self.forward(request).await
            }
        }
    }

    /// Relay a request to the origin, mapping transport failures to 502
    pub async fn forward(&self, request: Request) -> Response {
        match self.forwarder.forward(request).await {
            Ok(response) => response,
            Err(e) => AppError::Upstream(e).into_response(),
        }
    }
}
