//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::AccelerationGateway;
use crate::proxy::{ForwardError, OriginForwarder};
use crate::queue::ChunkPushQueue;
use crate::store::ChunkStore;
use crate::upload::ChunkUploader;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize origin forwarder: {0}")]
    Forwarder(#[from] ForwardError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: ChunkStore,
    uploader: ChunkUploader,
    gateway: AccelerationGateway,
}

impl AppState {
    pub fn new(config: Config, store: ChunkStore, queue: Arc<dyn ChunkPushQueue>) -> Result<Self, StateError> {
        let forwarder = OriginForwarder::new(&config.origin)?;
        let gateway = AccelerationGateway::new(store.clone(), forwarder, config.stream.join_buffer_limit);
        let uploader = ChunkUploader::new(store.clone(), queue);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                uploader,
                gateway,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the chunk store
    pub fn store(&self) -> &ChunkStore {
        &self.inner.store
    }

    /// Get the upload pipeline
    pub fn uploader(&self) -> &ChunkUploader {
        &self.inner.uploader
    }

    /// Get the acceleration gateway
    pub fn gateway(&self) -> &AccelerationGateway {
        &self.inner.gateway
    }
}
