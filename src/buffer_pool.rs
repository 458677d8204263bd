//! Reusable byte buffers for fetched items.
//!
//! The idle set is a bounded crossbeam channel, so `acquire` and `release`
//! are safe from any worker or the archive writer without an explicit lock.
//! A [`PooledBuffer`] has exactly one owner at a time; dropping it (or
//! passing it to [`BufferPool::release`]) clears it and hands the storage
//! back to the idle set.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// A pool of reusable byte buffers.
///
/// The pool bounds steady-state allocation, not concurrency: when no idle
/// buffer is available `acquire` allocates a new one instead of blocking,
/// and a released buffer that does not fit in the idle set is freed.
///
/// # Example
///
/// ```
/// use album_zip::BufferPool;
///
/// let pool = BufferPool::new(4, 1024);
/// let mut buffer = pool.acquire();
/// buffer.extend_from_slice(b"ID3");
/// pool.release(buffer);
///
/// let buffer = pool.acquire();
/// assert!(buffer.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

#[derive(Debug)]
struct PoolShared {
    idle_tx: Sender<Vec<u8>>,
    idle_rx: Receiver<Vec<u8>>,
    capacity: usize,
    initial_buffer_capacity: usize,
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
}

impl BufferPool {
    /// Create a pool that keeps at most `capacity` idle buffers.
    ///
    /// Newly allocated buffers reserve `initial_buffer_capacity` bytes.
    pub fn new(capacity: usize, initial_buffer_capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (idle_tx, idle_rx) = bounded(capacity);
        Self {
            shared: Arc::new(PoolShared {
                idle_tx,
                idle_rx,
                capacity,
                initial_buffer_capacity,
                created: AtomicUsize::new(0),
                recycled: AtomicUsize::new(0),
                dropped: AtomicUsize::new(0),
            }),
        }
    }

    /// Take an idle buffer, or allocate one if none is idle.
    ///
    /// The returned buffer is always empty.
    pub fn acquire(&self) -> PooledBuffer {
        let buffer = match self.shared.idle_rx.try_recv() {
            Ok(buffer) => {
                self.shared.recycled.fetch_add(1, Ordering::Relaxed);
                buffer
            }
            Err(_) => {
                self.shared.created.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.shared.initial_buffer_capacity)
            }
        };

        PooledBuffer {
            buffer,
            pool: Arc::clone(&self.shared),
        }
    }

    /// Reset a buffer and return it to the idle set.
    ///
    /// Equivalent to dropping it; provided so hand-back points read explicitly.
    pub fn release(&self, buffer: PooledBuffer) {
        drop(buffer);
    }

    /// Maximum number of idle buffers retained.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.shared.idle_rx.len()
    }

    /// Returns a snapshot of the current pool metrics.
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            created: self.shared.created.load(Ordering::Relaxed),
            recycled: self.shared.recycled.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }
}

impl PoolShared {
    fn recycle(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        if let Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) =
            self.idle_tx.try_send(buffer)
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A snapshot of buffer pool metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMetrics {
    /// Buffers allocated because no idle buffer was available
    pub created: usize,
    /// Acquisitions served from the idle set
    pub recycled: usize,
    /// Released buffers freed because the idle set was full
    pub dropped: usize,
}

/// A buffer on loan from a [`BufferPool`].
///
/// Dereferences to `Vec<u8>`. Returned to the pool when dropped.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<PoolShared>,
}

impl PooledBuffer {
    /// Returns a slice reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.pool.recycle(buffer);
    }
}
