//! Archive writer -- the single owner of the output sink.
//!
//! Runs on a blocking thread and drains the result queue one item at a time,
//! so the ZIP writer is never touched from two places and needs no lock.

use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;

use tokio::sync::mpsc;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::buffer_pool::BufferPool;
use crate::error::ArchiveError;
use crate::observer::Observer;
use crate::types::{Event, FetchedItem};

/// Entries at or above this size need ZIP64 headers
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// What the writer hands back to the coordinator.
pub(super) struct WriterOutcome<W> {
    /// The sink, if finalization succeeded
    pub(super) sink: Option<W>,
    /// Entry names in the order they were written
    pub(super) archived: Vec<String>,
    /// Fatal error that stopped the writer, if any
    pub(super) error: Option<ArchiveError>,
}

/// Output sink that is cut off after its first I/O error.
///
/// zip 0.6 finalizes a second time from `Drop` when `finish` fails. Once the
/// inner writer has failed it is never touched again: later writes, seeks
/// and flushes land on a virtual cursor and are discarded, so the container
/// trailer reaches the sink at most once.
struct FusedSink<W> {
    inner: W,
    failed: bool,
    position: u64,
    end: u64,
}

impl<W: Write + Seek> FusedSink<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            failed: false,
            position: 0,
            end: 0,
        }
    }

    fn into_inner(self) -> W {
        self.inner
    }

    fn advance_to(&mut self, position: u64) {
        self.position = position;
        self.end = self.end.max(position);
    }

    fn fuse<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if result.is_err() {
            self.failed = true;
        }
        result
    }
}

impl<W: Write + Seek> Write for FusedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failed {
            self.advance_to(self.position + buf.len() as u64);
            return Ok(buf.len());
        }
        let written = self.inner.write(buf);
        if let Ok(n) = written {
            self.advance_to(self.position + n as u64);
        }
        self.fuse(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.failed {
            return Ok(());
        }
        let flushed = self.inner.flush();
        self.fuse(flushed)
    }
}

impl<W: Write + Seek> Seek for FusedSink<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if !self.failed {
            let sought = self.inner.seek(pos);
            if let Ok(position) = sought {
                self.advance_to(position);
            }
            return self.fuse(sought);
        }

        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.end.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of discarded output",
            )),
        }
    }
}

/// Appends fetched items as named entries of one ZIP container.
pub(super) struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<FusedSink<W>>,
    pool: BufferPool,
    observer: Arc<dyn Observer>,
    archived: Vec<String>,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub(super) fn new(sink: W, pool: BufferPool, observer: Arc<dyn Observer>) -> Self {
        Self {
            zip: ZipWriter::new(FusedSink::new(sink)),
            pool,
            observer,
            archived: Vec::new(),
        }
    }

    /// Drain `results` until it is closed, then finalize the container.
    ///
    /// Finalization runs exactly once, on both the normal and the error path.
    /// After a sink error the queue is closed so blocked workers give up
    /// instead of waiting for a writer that is no longer reading.
    pub(super) fn run(mut self, mut results: mpsc::Receiver<FetchedItem>) -> WriterOutcome<W> {
        let drained = self.drain(&mut results);
        if drained.is_err() {
            results.close();
            // Queued items are dropped here, returning their buffers
            while results.try_recv().is_ok() {}
        }
        drop(results);

        let finished = self
            .zip
            .finish()
            .map(FusedSink::into_inner)
            .map_err(|e| ArchiveError::Finalize {
                reason: e.to_string(),
            });

        match (drained, finished) {
            (Ok(()), Ok(sink)) => WriterOutcome {
                sink: Some(sink),
                archived: self.archived,
                error: None,
            },
            (Err(error), Ok(sink)) => WriterOutcome {
                sink: Some(sink),
                archived: self.archived,
                error: Some(error),
            },
            (Ok(()), Err(error)) => WriterOutcome {
                sink: None,
                archived: self.archived,
                error: Some(error),
            },
            (Err(error), Err(_)) => WriterOutcome {
                sink: None,
                archived: self.archived,
                error: Some(error),
            },
        }
    }

    fn drain(&mut self, results: &mut mpsc::Receiver<FetchedItem>) -> Result<(), ArchiveError> {
        while let Some(item) = results.blocking_recv() {
            let bytes = self.write_entry(&item)?;
            self.observer.on_event(&Event::EntryWritten {
                entry_name: item.entry_name.clone(),
                bytes,
            });
            self.archived.push(item.entry_name);
            self.pool.release(item.buffer);
        }
        Ok(())
    }

    /// Create one entry, copy the buffer into it, and flush so a streaming
    /// reader sees the bytes without waiting for the trailer.
    fn write_entry(&mut self, item: &FetchedItem) -> Result<u64, ArchiveError> {
        let len = item.buffer.len() as u64;
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(len >= ZIP64_THRESHOLD);

        self.zip
            .start_file(item.entry_name.as_str(), options)
            .map_err(|e| ArchiveError::CreateEntry {
                entry_name: item.entry_name.clone(),
                reason: e.to_string(),
            })?;

        self.zip
            .write_all(item.buffer.as_slice())
            .and_then(|()| self.zip.flush())
            .map_err(|e| ArchiveError::WriteEntry {
                entry_name: item.entry_name.clone(),
                reason: e.to_string(),
            })?;

        Ok(len)
    }
}
