// ABOUTME: Bounded FIFO buffer of timestamped audio chunks
// ABOUTME: Hand-off point between the network receive path and playback

use crate::audio::AudioChunk;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default buffer capacity in bytes (4 MiB)
pub const DEFAULT_CAPACITY: usize = 4 * 1024 * 1024;

#[derive(Debug, Default)]
struct Inner {
    chunks: VecDeque<AudioChunk>,
    bytes: usize,
}

/// Bounded, byte-capacity-limited FIFO of timestamped PCM chunks.
///
/// The sole hand-off point between the network receive path (writer) and
/// the playback loop (reader). A write that would exceed the byte capacity
/// is rejected outright (drop-newest backpressure); chunks are read back
/// strictly in write order regardless of their embedded timestamps.
#[derive(Debug)]
pub struct ChunkBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
    total_writes: AtomicU64,
    total_reads: AtomicU64,
}

impl ChunkBuffer {
    /// Create a buffer with the default 4 MiB capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a buffer with an explicit byte capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
            total_writes: AtomicU64::new(0),
            total_reads: AtomicU64::new(0),
        }
    }

    /// Append a chunk, unless it would push the buffer past capacity.
    ///
    /// Returns `false` and leaves the buffer untouched when the chunk does
    /// not fit. The caller decides how loudly to complain.
    pub fn write(&self, chunk: AudioChunk) -> bool {
        let mut inner = self.inner.lock();
        if inner.bytes + chunk.len() > self.capacity {
            return false;
        }
        inner.bytes += chunk.len();
        inner.chunks.push_back(chunk);
        self.total_writes.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Pop the oldest chunk, or `None` when empty.
    pub fn read(&self) -> Option<AudioChunk> {
        let mut inner = self.inner.lock();
        let chunk = inner.chunks.pop_front()?;
        inner.bytes -= chunk.len();
        self.total_reads.fetch_add(1, Ordering::Relaxed);
        Some(chunk)
    }

    /// Look at the oldest chunk without removing it.
    ///
    /// Cheap: the payload is reference counted, so no audio bytes are
    /// copied.
    pub fn peek(&self) -> Option<AudioChunk> {
        self.inner.lock().chunks.front().cloned()
    }

    /// Drop everything and reset the byte count to zero.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.chunks.clear();
        inner.bytes = 0;
    }

    /// Total buffered bytes.
    pub fn bytes(&self) -> usize {
        self.inner.lock().bytes
    }

    /// Number of buffered chunks.
    pub fn len(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    /// Whether the buffer holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().chunks.is_empty()
    }

    /// Configured byte capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill level as a percentage of capacity.
    pub fn usage_percent(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.bytes() as f32 * 100.0 / self.capacity as f32
    }

    /// Chunks accepted since creation.
    pub fn total_writes(&self) -> u64 {
        self.total_writes.load(Ordering::Relaxed)
    }

    /// Chunks read since creation.
    pub fn total_reads(&self) -> u64 {
        self.total_reads.load(Ordering::Relaxed)
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}
