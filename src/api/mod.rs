//! HTTP front end
//!
//! Resolves an album page, archives its tracks through the pipeline and
//! streams the finished ZIP back to the client.

use crate::{Config, Result};
use axum::{Router, routing::get};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// - `GET /album/?url=<page>` - Archive every track of an album page as a ZIP download
/// - `GET /health` - Health check
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/album/", get(routes::download_album))
        .route("/album", get(routes::download_album))
        .route("/health", get(routes::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server on the configured bind address.
///
/// Runs until the server fails. See [`start_api_server_with_shutdown`] for
/// a server that stops on a signal.
///
/// # Example
///
/// ```no_run
/// use album_zip::Config;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// album_zip::api::start_api_server(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(config: Arc<Config>) -> Result<()> {
    start_api_server_with_shutdown(config, std::future::pending()).await
}

/// Start the API server and stop accepting connections once `shutdown` resolves.
///
/// Requests already in flight are allowed to finish.
pub async fn start_api_server_with_shutdown<F>(config: Arc<Config>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let bind_address = config.api.bind_address;

    tracing::info!(
        address = %bind_address,
        workers = config.pipeline.worker_count,
        "Starting API server"
    );

    let app = create_router(AppState::new(config)?);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
