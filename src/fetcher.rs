//! Item fetching -- download one track's bytes into a pooled buffer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::buffer_pool::BufferPool;
use crate::config::HttpConfig;
use crate::error::{FetchError, Result};
use crate::types::{FetchResult, FetchedItem, WorkItem};

/// Upper bound on what a Content-Length header may pre-reserve
const MAX_PRERESERVE_BYTES: u64 = 64 * 1024 * 1024;

/// Abstraction over where item bytes come from, enabling testability.
#[async_trait]
pub trait Source: Send + Sync {
    /// Append the full content at `url` to `buffer`.
    ///
    /// On error the buffer contents are unspecified; the caller discards them.
    async fn download(&self, url: &str, buffer: &mut Vec<u8>) -> std::result::Result<(), FetchError>;
}

/// Production [`Source`] backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Wrap an existing client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client from HTTP settings
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Ok(Self::new(config.build_client()?))
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn download(&self, url: &str, buffer: &mut Vec<u8>) -> std::result::Result<(), FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let expected = response.content_length();
        if let Some(len) = expected {
            buffer.reserve(len.min(MAX_PRERESERVE_BYTES) as usize);
        }

        let mut received: u64 = 0;
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return Ok(()),
                Err(e) => {
                    return Err(match expected {
                        Some(expected) if ended_early(&e) => FetchError::Truncated {
                            url: url.to_string(),
                            expected,
                            received,
                        },
                        _ => FetchError::from_reqwest(url, &e),
                    });
                }
            };
            received += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);
        }
    }
}

/// Whether the connection closed before the advertised body length arrived.
///
/// hyper enforces Content-Length itself and reports a short body as an
/// `UnexpectedEof` I/O error somewhere in the source chain.
fn ended_early(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::UnexpectedEof)
        {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Fetches one [`WorkItem`] into a buffer taken from the pool.
///
/// On success the filled buffer moves into the returned [`FetchedItem`].
/// On failure the buffer goes straight back to the pool and is never
/// forwarded downstream.
#[derive(Clone)]
pub struct ItemFetcher {
    source: Arc<dyn Source>,
    pool: BufferPool,
}

impl ItemFetcher {
    /// Create a fetcher drawing buffers from `pool`
    pub fn new(source: Arc<dyn Source>, pool: BufferPool) -> Self {
        Self { source, pool }
    }

    /// The pool buffers are drawn from
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Download `item` in full.
    pub async fn fetch(&self, item: &WorkItem) -> FetchResult {
        let mut buffer = self.pool.acquire();
        match self.source.download(&item.descriptor.url, &mut buffer).await {
            Ok(()) => Ok(FetchedItem {
                index: item.index,
                entry_name: item.entry_name.clone(),
                buffer,
            }),
            Err(e) => {
                self.pool.release(buffer);
                Err(e)
            }
        }
    }
}
