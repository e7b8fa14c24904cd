//! Numbered chunks and the buffer pool they are carved from

use crossbeam::queue::ArrayQueue;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// A numbered slice of the source stream
///
/// Immutable once created. Ownership moves from the source to a reader,
/// into the staging queue, to a writer, and finally back to the pool.
#[derive(Debug)]
pub struct Chunk {
    sequence: u64,
    payload: Vec<u8>,
    length: usize,
}

impl Chunk {
    /// Wrap `length` valid bytes of `payload` as chunk number `sequence`
    pub fn new(sequence: u64, payload: Vec<u8>, length: usize) -> Self {
        debug_assert!(length <= payload.len());
        Self {
            sequence,
            payload,
            length,
        }
    }

    /// Position of this chunk in the source stream
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Number of valid bytes
    pub fn len(&self) -> usize {
        self.length
    }

    /// True for a chunk carrying no bytes
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The valid bytes
    pub fn bytes(&self) -> &[u8] {
        &self.payload[..self.length]
    }

    /// Give up the backing buffer so it can be recycled
    pub fn into_buffer(self) -> Vec<u8> {
        self.payload
    }
}

// Chunks order by sequence only; payloads never take part in comparisons.
impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for Chunk {}

impl PartialOrd for Chunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Chunk {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

/// Most idle buffers a pool keeps, whatever capacity it was asked for
pub const MAX_IDLE_BUFFERS: usize = 4096;

/// Pool of reusable fixed-size chunk buffers
///
/// Buffers are allocated lazily and recycled after a writer is done with
/// them. The free list holds at most `min(capacity, MAX_IDLE_BUFFERS)`
/// buffers; releasing into a full pool drops the buffer.
#[derive(Debug)]
pub struct BufferPool {
    free: ArrayQueue<Vec<u8>>,
    buffer_size: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
}

impl BufferPool {
    /// Create a pool holding at most `capacity` idle buffers of `buffer_size` bytes
    pub fn new(buffer_size: usize, capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity.clamp(1, MAX_IDLE_BUFFERS)),
            buffer_size,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Take an idle buffer, or allocate one if none is idle
    pub fn acquire(&self) -> Vec<u8> {
        match self.free.pop() {
            Some(buf) => {
                self.reused.fetch_add(1, AtomicOrdering::Relaxed);
                buf
            }
            None => {
                self.allocated.fetch_add(1, AtomicOrdering::Relaxed);
                vec![0u8; self.buffer_size]
            }
        }
    }

    /// Return a buffer for reuse
    pub fn release(&self, mut buf: Vec<u8>) {
        // A foreign buffer is resized so every pooled buffer is full size.
        if buf.len() != self.buffer_size {
            buf.resize(self.buffer_size, 0);
        }
        let _ = self.free.push(buf);
    }

    /// Size of each buffer in bytes
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Buffers currently idle in the pool
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Buffers allocated over the pool's lifetime
    pub fn allocated(&self) -> u64 {
        self.allocated.load(AtomicOrdering::Relaxed)
    }

    /// Acquisitions served from an idle buffer
    pub fn reused(&self) -> u64 {
        self.reused.load(AtomicOrdering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    #[test]
    fn test_chunk_exposes_valid_bytes_only() {
        let chunk = Chunk::new(3, vec![1, 2, 3, 4, 5], 2);
        assert_eq!(chunk.sequence(), 3);
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.bytes(), &[1, 2]);
        assert_eq!(chunk.into_buffer().len(), 5);
    }

    #[test]
    fn test_chunks_order_by_sequence() {
        let mut heap = BinaryHeap::new();
        for seq in [4u64, 0, 2, 1, 3] {
            heap.push(Reverse(Chunk::new(seq, vec![seq as u8], 1)));
        }
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|Reverse(c)| c.sequence()))
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_pool_recycles_buffers() {
        let pool = BufferPool::new(16, 2);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.allocated(), 2);
        assert_eq!(a.len(), 16);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 2);

        let _c = pool.acquire();
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.reused(), 1);
    }

    #[test]
    fn test_pool_free_list_is_bounded() {
        let pool = BufferPool::new(4, usize::MAX);
        for _ in 0..MAX_IDLE_BUFFERS + 10 {
            pool.release(vec![0u8; 4]);
        }
        assert_eq!(pool.idle(), MAX_IDLE_BUFFERS);
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn test_pool_drops_overflow_and_normalizes_size() {
        let pool = BufferPool::new(8, 1);
        pool.release(vec![0u8; 3]);
        pool.release(vec![0u8; 8]);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.acquire().len(), 8);
    }
}
