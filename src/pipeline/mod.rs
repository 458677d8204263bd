//! Concurrent fetch-and-archive pipeline.
//!
//! Split into focused submodules:
//! - [`workers`] - fetch worker pool draining the item queue
//! - [`archive_writer`] - single consumer appending entries to the ZIP sink
//!
//! The coordinator in this module wires the two queues together and walks
//! a job through `Created -> Running -> Draining -> Completed | Failed`.

mod archive_writer;
mod workers;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::io::{Seek, Write};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::buffer_pool::BufferPool;
use crate::config::PipelineConfig;
use crate::error::{ArchiveError, Error, Result};
use crate::fetcher::{ItemFetcher, Source};
use crate::observer::{NoopObserver, Observer};
use crate::types::{Event, FailedItem, ItemDescriptor, JobReport, JobState, WorkItem};

use archive_writer::ArchiveWriter;
use workers::{WorkerContext, join_workers, spawn_workers};

/// Open an anonymous temporary file to receive an archive.
///
/// Failing here is a setup failure: the job is never started.
pub fn open_temp_sink(dir: Option<&Path>) -> Result<std::fs::File> {
    let file = match dir {
        Some(dir) => tempfile::tempfile_in(dir),
        None => tempfile::tempfile(),
    };
    file.map_err(|e| Error::Setup(format!("unable to create temp file: {}", e)))
}

/// One run of the fetch-and-archive pipeline over an album.
///
/// Owns the item list, the output sink and the buffer pool for the
/// duration of the run. A job runs at most once.
///
/// # Example
///
/// ```no_run
/// use album_zip::{HttpSource, ItemDescriptor, PipelineJob};
/// use album_zip::config::Config;
/// use std::io::Cursor;
/// use std::sync::Arc;
///
/// # async fn example() -> album_zip::Result<()> {
/// let config = Config::default();
/// let source = Arc::new(HttpSource::from_config(&config.http)?);
/// let items = vec![ItemDescriptor::new("A", "T1", "http://example.com/1.mp3")];
///
/// let mut job = PipelineJob::new(items, Cursor::new(Vec::new()), source, &config.pipeline);
/// let report = job.run().await?;
/// println!("{} archived, {} failed", report.succeeded(), report.failure_count());
/// let zip_bytes = job.into_sink().map(Cursor::into_inner);
/// # Ok(())
/// # }
/// ```
pub struct PipelineJob<W> {
    items: Vec<ItemDescriptor>,
    config: PipelineConfig,
    source: Arc<dyn Source>,
    pool: BufferPool,
    observer: Arc<dyn Observer>,
    cancel: CancellationToken,
    sink: Option<W>,
    state: JobState,
    report: Option<JobReport>,
}

impl<W> PipelineJob<W>
where
    W: Write + Seek + Send + 'static,
{
    /// Create a job in the `Created` state.
    pub fn new(
        items: Vec<ItemDescriptor>,
        sink: W,
        source: Arc<dyn Source>,
        config: &PipelineConfig,
    ) -> Self {
        let pool = BufferPool::new(config.buffer_pool_capacity, config.buffer_initial_capacity);
        Self {
            items,
            config: config.clone(),
            source,
            pool,
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
            sink: Some(sink),
            state: JobState::Created,
            report: None,
        }
    }

    /// Report events to `observer` instead of discarding them
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Stop enqueueing new items once `token` is cancelled.
    ///
    /// Items already handed to workers still finish and the archive is
    /// still finalized.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Draw buffers from a pool shared with other jobs
    pub fn with_buffer_pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Report of the finished run, if the job has run
    pub fn report(&self) -> Option<&JobReport> {
        self.report.as_ref()
    }

    /// The pool item buffers are drawn from
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Take back the sink.
    ///
    /// After `Completed` this is the finalized archive. After `Failed` it is
    /// a partially written, unusable archive (or `None` if even
    /// finalization failed).
    pub fn into_sink(self) -> Option<W> {
        self.sink
    }

    /// Run the job to completion.
    ///
    /// Item fetch failures do not fail the job; they are listed in the
    /// returned report. A sink failure moves the job to `Failed` and is
    /// returned as [`Error::Archive`].
    pub async fn run(&mut self) -> Result<JobReport> {
        if self.state != JobState::Created {
            return Err(Error::InvalidState {
                operation: "run".to_string(),
                state: self.state.to_string(),
            });
        }
        let sink = self
            .sink
            .take()
            .ok_or_else(|| Error::Setup("output sink missing".to_string()))?;

        let worker_count = self.config.worker_count.max(1);
        let work_items = self.work_items();
        let total = work_items.len();

        let (item_tx, item_rx) = async_channel::bounded::<WorkItem>(worker_count);
        let (result_tx, result_rx) =
            mpsc::channel(self.config.effective_result_queue_capacity());

        self.state = JobState::Running;

        let writer = ArchiveWriter::new(sink, self.pool.clone(), Arc::clone(&self.observer));
        let writer_handle = tokio::task::spawn_blocking(move || writer.run(result_rx));

        let worker_handles = spawn_workers(
            worker_count,
            WorkerContext {
                fetcher: ItemFetcher::new(Arc::clone(&self.source), self.pool.clone()),
                items: item_rx,
                results: result_tx.clone(),
                observer: Arc::clone(&self.observer),
            },
        );

        let enqueued = enqueue(item_tx, work_items, &self.cancel).await;
        if enqueued < total {
            self.observer.on_event(&Event::EnqueueStopped { enqueued, total });
        }

        self.state = JobState::Draining;
        let failed = join_workers(worker_handles, self.observer.as_ref()).await;
        drop(result_tx);

        let outcome = match writer_handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                return Err(self.fail(
                    ArchiveError::WriterPanicked(e.to_string()),
                    Vec::new(),
                    failed,
                    total - enqueued,
                ));
            }
        };

        self.sink = outcome.sink;
        if let Some(error) = outcome.error {
            return Err(self.fail(error, outcome.archived, failed, total - enqueued));
        }

        let report = JobReport {
            state: JobState::Completed,
            archived: outcome.archived,
            failed,
            skipped: total - enqueued,
        };
        self.state = JobState::Completed;
        self.observer.on_event(&Event::JobCompleted {
            archived: report.succeeded(),
            failed: report.failure_count(),
        });
        self.report = Some(report.clone());
        Ok(report)
    }

    /// Pair each descriptor with a collision-free entry name, in album order.
    fn work_items(&self) -> Vec<WorkItem> {
        let names = crate::utils::disambiguate(
            self.items.iter().map(ItemDescriptor::entry_name).collect(),
        );
        self.items
            .iter()
            .cloned()
            .zip(names)
            .enumerate()
            .map(|(index, (descriptor, entry_name))| WorkItem {
                index,
                descriptor,
                entry_name,
            })
            .collect()
    }

    fn fail(
        &mut self,
        error: ArchiveError,
        archived: Vec<String>,
        failed: Vec<FailedItem>,
        skipped: usize,
    ) -> Error {
        self.state = JobState::Failed;
        self.observer.on_event(&Event::JobFailed {
            error: error.to_string(),
        });
        self.report = Some(JobReport {
            state: JobState::Failed,
            archived,
            failed,
            skipped,
        });
        Error::Archive(error)
    }
}

/// Feed the item queue, then close it by dropping the sender.
///
/// Returns how many items were enqueued. Stops early on cancellation or
/// when every worker has exited.
async fn enqueue(
    item_tx: async_channel::Sender<WorkItem>,
    work_items: Vec<WorkItem>,
    cancel: &CancellationToken,
) -> usize {
    let mut enqueued = 0;
    for item in work_items {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = item_tx.send(item) => {
                if sent.is_err() {
                    break;
                }
                enqueued += 1;
            }
        }
    }
    enqueued
}
