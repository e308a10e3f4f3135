//! Bounded single-producer/single-consumer queue that drops on saturation

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Capacity used when the configuration does not say otherwise
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

struct Stats {
    capacity: usize,
    dropped: AtomicU64,
}

/// Fixed-capacity queue that discards the newest write when full
///
/// Built on a bounded `tokio::sync::mpsc` channel. Writers never block:
/// when the channel already holds `capacity` items the incoming item is
/// thrown away and [`QueueWriter::write`] reports `false`. Items already
/// queued are kept in FIFO order.
///
/// The queue is split into exactly one [`QueueWriter`] and one
/// [`QueueReader`]. Closing (explicitly, or by dropping either half) stops
/// further writes; the reader still drains what was queued before it
/// observes end-of-stream.
pub struct BoundedDropQueue<T> {
    tx: mpsc::Sender<T>,
    rx: mpsc::Receiver<T>,
    stats: Arc<Stats>,
}

impl<T> BoundedDropQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx,
            stats: Arc::new(Stats {
                capacity,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Split into the single writer and single reader
    pub fn split(self) -> (QueueWriter<T>, QueueReader<T>) {
        (
            QueueWriter {
                tx: Mutex::new(Some(self.tx)),
                stats: Arc::clone(&self.stats),
            },
            QueueReader {
                rx: self.rx,
                stats: self.stats,
            },
        )
    }
}

impl<T> Default for BoundedDropQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Producing half of a [`BoundedDropQueue`]
pub struct QueueWriter<T> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
    stats: Arc<Stats>,
}

impl<T> QueueWriter<T> {
    /// Try to enqueue `item`
    ///
    /// Returns `false` when the queue is full (the item is dropped) or
    /// closed. Never blocks.
    pub fn write(&self, item: T) -> bool {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return false;
        };
        match tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(
                    capacity = self.stats.capacity,
                    dropped,
                    "Queue full, dropping newest write"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Close the queue. Idempotent.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Number of items waiting to be read; zero once this writer is closed
    pub fn len(&self) -> usize {
        self.tx
            .lock()
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.stats.capacity
    }

    /// Writes discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

/// Consuming half of a [`BoundedDropQueue`]
pub struct QueueReader<T> {
    rx: mpsc::Receiver<T>,
    stats: Arc<Stats>,
}

impl<T> QueueReader<T> {
    /// Wait for the next item
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next item if one is ready
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Close the queue. Queued items can still be read.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.stats.capacity
    }
}

impl<T: Send + 'static> QueueReader<T> {
    /// Read every item in FIFO order as it becomes available
    ///
    /// The stream ends when the queue is closed and drained.
    pub fn read_all(self) -> BoxStream<'static, T> {
        stream::unfold(self, |mut reader| async move {
            reader.recv().await.map(|item| (item, reader))
        })
        .boxed()
    }
}
