//! Application state for the API server

use crate::album::AlbumResolver;
use crate::buffer_pool::BufferPool;
use crate::fetcher::{HttpSource, Source};
use crate::observer::{Observer, TracingObserver};
use crate::{Config, Result};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clones). Every album job draws from
/// the same buffer pool and HTTP client.
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Config>,

    /// Resolves album pages into track lists
    pub resolver: AlbumResolver,

    /// Where track bytes are downloaded from
    pub source: Arc<dyn Source>,

    /// Buffers shared by all concurrent jobs
    pub pool: BufferPool,

    /// Receives pipeline events
    pub observer: Arc<dyn Observer>,
}

impl AppState {
    /// Create state with an HTTP client built from `config.http`
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = config.http.build_client()?;
        let pool = BufferPool::new(
            config.pipeline.buffer_pool_capacity,
            config.pipeline.buffer_initial_capacity,
        );
        Ok(Self {
            resolver: AlbumResolver::new(client.clone()),
            source: Arc::new(HttpSource::new(client)),
            pool,
            observer: Arc::new(TracingObserver),
            config,
        })
    }

    /// Replace the event observer
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }
}
