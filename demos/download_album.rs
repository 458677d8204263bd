//! Album download example
//!
//! Resolves an album page, fetches every track and writes the ZIP archive
//! into a local directory, then prints what made it in.
//!
//! ```bash
//! cargo run --example download_album -- --url https://example.com/album/best-of.html --dir downloads
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use album_zip::api::routes::archive_filename;
use album_zip::{AlbumResolver, Config, HttpSource, PipelineJob, TracingObserver};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Download an album into a single ZIP archive", long_about = None)]
struct Args {
    /// Album page to resolve
    #[arg(long)]
    url: String,

    /// Directory the archive is written into
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Concurrent track downloads
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("album_zip=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::default();
    config.pipeline.worker_count = args.workers;
    config.validate()?;

    let album = AlbumResolver::from_config(&config.http)?
        .resolve(&args.url)
        .await?;
    println!("Found {} tracks", album.len());

    std::fs::create_dir_all(&args.dir)?;
    let path = args.dir.join(archive_filename(&args.url));
    let sink = std::fs::File::create(&path)?;

    let source = Arc::new(HttpSource::from_config(&config.http)?);
    let mut job = PipelineJob::new(album.descriptors(), sink, source, &config.pipeline)
        .with_observer(Arc::new(TracingObserver));

    let report = match job.run().await {
        Ok(report) => report,
        Err(e) => {
            // A failed archive is unusable
            drop(job);
            std::fs::remove_file(&path).ok();
            return Err(e.into());
        }
    };

    println!("Wrote {}", path.display());
    println!("  archived: {}", report.succeeded());
    for entry in &report.archived {
        println!("    {}", entry);
    }
    if report.failure_count() > 0 {
        println!("  failed:   {}", report.failure_count());
        for failed in &report.failed {
            println!("    {} ({})", failed.entry_name, failed.error);
        }
    }

    Ok(())
}
