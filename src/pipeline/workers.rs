//! Fetch worker pool -- N tasks draining the shared item queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fetcher::ItemFetcher;
use crate::observer::Observer;
use crate::types::{Event, FailedItem, FetchedItem, WorkItem};

/// Everything a worker needs, cloned once per worker.
///
/// Each clone holds its own receiver of the item queue; whichever worker
/// is idle first takes the next item.
#[derive(Clone)]
pub(super) struct WorkerContext {
    pub(super) fetcher: ItemFetcher,
    pub(super) items: async_channel::Receiver<WorkItem>,
    pub(super) results: mpsc::Sender<FetchedItem>,
    pub(super) observer: Arc<dyn Observer>,
}

/// Spawn `count` workers. Each handle resolves to the items that worker failed to fetch.
pub(super) fn spawn_workers(count: usize, ctx: WorkerContext) -> Vec<JoinHandle<Vec<FailedItem>>> {
    (0..count).map(|_| tokio::spawn(run_worker(ctx.clone()))).collect()
}

/// Worker loop.
///
/// Exits when the item queue is closed and drained, or when the archive
/// writer has stopped accepting results. A failed fetch is recorded and
/// the loop moves on to the next item.
pub(super) async fn run_worker(ctx: WorkerContext) -> Vec<FailedItem> {
    let mut failed = Vec::new();

    loop {
        if ctx.results.is_closed() {
            break;
        }

        let Ok(item) = ctx.items.recv().await else {
            break;
        };
        // The writer may have stopped while this worker was waiting
        if ctx.results.is_closed() {
            break;
        }

        ctx.observer.on_event(&Event::FetchStarted {
            index: item.index,
            artist: item.descriptor.artist.clone(),
            title: item.descriptor.title.clone(),
            url: item.descriptor.url.clone(),
        });

        match ctx.fetcher.fetch(&item).await {
            Ok(fetched) => {
                ctx.observer.on_event(&Event::FetchSucceeded {
                    index: fetched.index,
                    entry_name: fetched.entry_name.clone(),
                    bytes: fetched.buffer.len() as u64,
                });

                // Blocks while the result queue is full
                if ctx.results.send(fetched).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                ctx.observer.on_event(&Event::FetchFailed {
                    index: item.index,
                    url: item.descriptor.url.clone(),
                    error: error.to_string(),
                });
                failed.push(FailedItem {
                    index: item.index,
                    descriptor: item.descriptor,
                    entry_name: item.entry_name,
                    error,
                });
            }
        }
    }

    failed
}

/// Wait for every worker and gather their failures in descriptor order.
pub(super) async fn join_workers(
    handles: Vec<JoinHandle<Vec<FailedItem>>>,
    observer: &dyn Observer,
) -> Vec<FailedItem> {
    let mut failed = Vec::new();
    for (worker_id, result) in futures::future::join_all(handles)
        .await
        .into_iter()
        .enumerate()
    {
        match result {
            Ok(items) => failed.extend(items),
            Err(e) => observer.on_event(&Event::WorkerAborted {
                worker_id,
                error: e.to_string(),
            }),
        }
    }
    failed.sort_by_key(|f| f.index);
    failed
}
