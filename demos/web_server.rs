//! Album archive web server example
//!
//! Serves `GET /album/?url=<album page>` and answers with a ZIP of every
//! track on the page.
//!
//! ```bash
//! cargo run --example web_server -- 8000
//! curl -o album.zip 'http://localhost:8000/album/?url=https://example.com/album/best-of.html'
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default: `album_zip=debug,tower_http=info`).

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use album_zip::{Config, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("album_zip=debug,tower_http=info")),
        )
        .init();

    let port: u16 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 8000,
    };

    let mut config = Config::default();
    config.api.bind_address = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(
        port,
        workers = config.pipeline.worker_count,
        "Serving album archives at /album/?url=<page>"
    );

    // Blocks until SIGTERM / Ctrl+C
    run_with_shutdown(Arc::new(config)).await?;

    Ok(())
}
