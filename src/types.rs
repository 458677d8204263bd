//! Core types for album-zip

use serde::{Deserialize, Serialize};

use crate::buffer_pool::PooledBuffer;
use crate::error::FetchError;

/// One fetchable track of an album.
///
/// Produced by album resolution; read-only inside the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Performing artist
    pub artist: String,
    /// Track title
    pub title: String,
    /// Where the track's bytes are downloaded from
    pub url: String,
}

impl ItemDescriptor {
    /// Create a new descriptor
    pub fn new(artist: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            url: url.into(),
        }
    }

    /// Archive entry name derived from artist and title, before collision handling.
    pub fn entry_name(&self) -> String {
        crate::utils::entry_name(&self.artist, &self.title)
    }
}

/// A descriptor paired with its final, collision-free entry name.
///
/// This is what travels on the item queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    /// Position of the descriptor in the album
    pub index: usize,
    /// The track to fetch
    pub descriptor: ItemDescriptor,
    /// Name of the archive entry the track will be written to
    pub entry_name: String,
}

/// A successfully fetched track, on its way to the archive writer.
///
/// Owns the filled buffer; the writer releases it after copying.
#[derive(Debug)]
pub struct FetchedItem {
    /// Position of the descriptor in the album
    pub index: usize,
    /// Name of the archive entry to create
    pub entry_name: String,
    /// Downloaded bytes
    pub buffer: PooledBuffer,
}

/// Outcome of fetching one item.
pub type FetchResult = std::result::Result<FetchedItem, FetchError>;

/// A track that could not be fetched and is absent from the archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedItem {
    /// Position of the descriptor in the album
    pub index: usize,
    /// The track that failed
    pub descriptor: ItemDescriptor,
    /// Entry name it would have had
    pub entry_name: String,
    /// Why it failed
    pub error: FetchError,
}

/// Lifecycle of a pipeline job. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Queues allocated, nothing started
    Created,
    /// Workers and writer started, descriptors being enqueued
    Running,
    /// Item queue closed, waiting for workers then the writer
    Draining,
    /// Writer finished normally and the archive is finalized
    Completed,
    /// Writer hit a fatal sink error
    Failed,
}

impl JobState {
    /// Whether the job has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Created => "created",
            JobState::Running => "running",
            JobState::Draining => "draining",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Summary of a finished job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobReport {
    /// Terminal state reached
    pub state: JobState,
    /// Entry names written, in archive order
    pub archived: Vec<String>,
    /// Items left out of the archive, in descriptor order
    pub failed: Vec<FailedItem>,
    /// Items never enqueued because the job was cancelled
    pub skipped: usize,
}

impl JobReport {
    /// Number of entries written to the archive
    pub fn succeeded(&self) -> usize {
        self.archived.len()
    }

    /// Number of items that failed to fetch
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// True when the job completed, regardless of item failures
    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }
}

/// Diagnostic events emitted by the pipeline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A worker started downloading an item
    FetchStarted {
        /// Position of the descriptor in the album
        index: usize,
        /// Track artist
        artist: String,
        /// Track title
        title: String,
        /// Source URL
        url: String,
    },

    /// An item was downloaded in full
    FetchSucceeded {
        /// Position of the descriptor in the album
        index: usize,
        /// Entry name the item will be written to
        entry_name: String,
        /// Number of bytes downloaded
        bytes: u64,
    },

    /// An item could not be downloaded and will be skipped
    FetchFailed {
        /// Position of the descriptor in the album
        index: usize,
        /// Source URL
        url: String,
        /// Error message
        error: String,
    },

    /// An entry was appended to the archive and flushed
    EntryWritten {
        /// Entry name
        entry_name: String,
        /// Number of bytes written
        bytes: u64,
    },

    /// Enqueueing stopped before every item was handed to a worker
    EnqueueStopped {
        /// Items handed to workers
        enqueued: usize,
        /// Items in the album
        total: usize,
    },

    /// A fetch worker ended abnormally; its unfinished item is lost
    WorkerAborted {
        /// Position of the worker in the pool
        worker_id: usize,
        /// Join error message
        error: String,
    },

    /// The job finished and the archive is finalized
    JobCompleted {
        /// Entries written
        archived: usize,
        /// Items that failed to fetch
        failed: usize,
    },

    /// The archive sink failed; the output must be discarded
    JobFailed {
        /// Error message
        error: String,
    },
}
