//! Album archive handler.

use super::AlbumQuery;
use crate::api::AppState;
use crate::error::{Error, Result};
use crate::pipeline::{PipelineJob, open_temp_sink};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;
use url::Url;

/// Header carrying the number of tracks left out of the archive
pub const FAILED_ITEMS_HEADER: &str = "x-album-failed-items";

/// GET /album/?url=<page> - Archive every track of an album
///
/// The archive is built into a temporary file and streamed once the job
/// has completed. Tracks that could not be downloaded are left out; their
/// count is reported in the `x-album-failed-items` header.
pub async fn download_album(
    State(state): State<AppState>,
    Query(query): Query<AlbumQuery>,
) -> Result<Response> {
    let page_url = query.url.unwrap_or_default();
    tracing::info!(page_url = %page_url, "Album archive request");

    let album = state.resolver.resolve(&page_url).await?;
    tracing::debug!(page_url = %page_url, item_count = album.len(), "Found items to archive");

    let file = open_temp_sink(state.config.api.temp_dir.as_deref())?;
    let mut job = PipelineJob::new(
        album.descriptors(),
        file,
        state.source.clone(),
        &state.config.pipeline,
    )
    .with_observer(state.observer.clone())
    .with_buffer_pool(state.pool.clone());

    let report = job.run().await?;
    tracing::info!(
        page_url = %page_url,
        archived = report.succeeded(),
        failed = report.failure_count(),
        "Album archive completed"
    );

    let file = job
        .into_sink()
        .ok_or_else(|| Error::Setup("archive file missing after completion".to_string()))?;
    let mut file = tokio::fs::File::from_std(file);
    file.rewind().await?;

    let disposition = format!("attachment; filename=\"{}\"", archive_filename(&page_url));
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"))],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response();

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(FAILED_ITEMS_HEADER, HeaderValue::from(report.failure_count()));

    Ok(response)
}

/// Download filename for an album page: its last path segment, minus any
/// extension, restricted to a header-safe character set.
pub fn archive_filename(page_url: &str) -> String {
    let stem = Url::parse(page_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .map(|segment| match segment.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => segment,
        })
        .map(|stem| {
            stem.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "album".to_string());

    format!("{}.zip", stem)
}
