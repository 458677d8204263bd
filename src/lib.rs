//! # album-zip
//!
//! Download every track of an album concurrently and pack them into a single
//! ZIP archive.
//!
//! ## Design
//!
//! - **Bounded** - a fixed pool of fetch workers and a small result queue keep
//!   memory proportional to the worker count, not the album size
//! - **Single writer** - one task owns the output sink, so entries never interleave
//! - **Best effort** - a track that fails to download is reported and left out;
//!   only a failing sink fails the job
//! - **Observable** - progress is delivered to an injected [`Observer`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use album_zip::{AlbumResolver, BroadcastObserver, Config, HttpSource, PipelineJob};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let album = AlbumResolver::from_config(&config.http)?
//!         .resolve("https://example.com/album/best-of.html")
//!         .await?;
//!
//!     let observer = Arc::new(BroadcastObserver::new(256));
//!     let mut events = observer.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let sink = std::fs::File::create("album.zip")?;
//!     let source = Arc::new(HttpSource::from_config(&config.http)?);
//!     let mut job = PipelineJob::new(album.descriptors(), sink, source, &config.pipeline)
//!         .with_observer(observer);
//!
//!     let report = job.run().await?;
//!     println!("{} archived, {} failed", report.succeeded(), report.failure_count());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Album page resolution
pub mod album;
/// HTTP front end
pub mod api;
/// Reusable download buffers
pub mod buffer_pool;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Item download
pub mod fetcher;
/// Pipeline event observers
pub mod observer;
/// Fetch-and-archive pipeline (decomposed into focused submodules)
pub mod pipeline;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use album::{Album, AlbumItem, AlbumResolver};
pub use buffer_pool::{BufferPool, PoolMetrics, PooledBuffer};
pub use config::{ApiConfig, Config, HttpConfig, PipelineConfig};
pub use error::{
    AlbumError, ApiError, ArchiveError, Error, ErrorDetail, FetchError, Result, ToHttpStatus,
};
pub use fetcher::{HttpSource, ItemFetcher, Source};
pub use observer::{BroadcastObserver, NoopObserver, Observer, TracingObserver};
pub use pipeline::{PipelineJob, open_temp_sink};
pub use types::{
    Event, FailedItem, FetchResult, FetchedItem, ItemDescriptor, JobReport, JobState, WorkItem,
};

/// Run the API server until SIGTERM or Ctrl+C.
///
/// Requests in flight when the signal arrives are allowed to finish.
///
/// # Example
///
/// ```no_run
/// use album_zip::{Config, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     run_with_shutdown(Arc::new(Config::default())).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(config: std::sync::Arc<Config>) -> Result<()> {
    api::start_api_server_with_shutdown(config, wait_for_signal()).await
}

/// Resolve on SIGTERM or Ctrl+C, whichever comes first.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
            }
            return;
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupted, shutting down"),
        Err(e) => {
            // Without a handler the server runs until the process is killed
            tracing::warn!(error = %e, "Unable to listen for shutdown signals");
            std::future::pending::<()>().await;
        }
    }
}
