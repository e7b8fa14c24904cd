//! Sequential chunk source shared by the reader pool

use crate::error::{CopyError, Result};
use crate::pipeline::{lock, BufferPool, Chunk};
use crate::stats::{Stage, WorkerTimings};
use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex};

struct SourceState<R> {
    reader: R,
    next_sequence: u64,
    bytes_read: u64,
    exhausted: bool,
}

/// Hands out sequentially numbered chunks of an input stream
///
/// The read and the sequence assignment happen as one step under a single
/// lock, so chunk `n` always holds the bytes that follow chunk `n - 1`.
pub struct ChunkSource<R> {
    state: Mutex<SourceState<R>>,
    pool: Arc<BufferPool>,
}

impl<R: Read> ChunkSource<R> {
    /// Wrap a reader; chunk buffers come from `pool`
    pub fn new(reader: R, pool: Arc<BufferPool>) -> Self {
        Self {
            state: Mutex::new(SourceState {
                reader,
                next_sequence: 0,
                bytes_read: 0,
                exhausted: false,
            }),
            pool,
        }
    }

    /// Read the next chunk, or `None` once the stream is exhausted
    ///
    /// Every chunk except the last is exactly one buffer long. After the
    /// first `None` every later call returns `None` without touching the
    /// reader.
    pub fn next_chunk(&self, timings: &mut WorkerTimings) -> Result<Option<Chunk>> {
        let mut state = timings.time(Stage::Lock, || lock(&self.state));
        if state.exhausted {
            return Ok(None);
        }

        let sequence = state.next_sequence;
        let mut buf = self.pool.acquire();
        let started = timings.start();
        let filled = fill(&mut state.reader, &mut buf);
        timings.finish(Stage::Io, started);

        let filled = match filled {
            Ok(filled) => filled,
            Err(source) => {
                state.exhausted = true;
                self.pool.release(buf);
                return Err(CopyError::SourceRead { sequence, source });
            }
        };

        if filled < buf.len() {
            state.exhausted = true;
        }
        if filled == 0 {
            self.pool.release(buf);
            tracing::trace!("source exhausted after {} chunks", sequence);
            return Ok(None);
        }

        state.next_sequence += 1;
        state.bytes_read += filled as u64;
        Ok(Some(Chunk::new(sequence, buf, filled)))
    }

    /// Chunks issued so far
    pub fn chunks_issued(&self) -> u64 {
        lock(&self.state).next_sequence
    }

    /// Bytes read so far
    pub fn bytes_read(&self) -> u64 {
        lock(&self.state).bytes_read
    }

    /// Whether end-of-stream has been observed
    pub fn is_exhausted(&self) -> bool {
        lock(&self.state).exhausted
    }
}

/// Read until `buf` is full or the reader reports end-of-stream
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerRole;
    use std::io::Cursor;

    fn timings() -> WorkerTimings {
        WorkerTimings::new(WorkerRole::Reader, 0, false)
    }

    /// Returns at most `step` bytes per read call
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn test_sequential_numbering_and_short_tail() {
        let data: Vec<u8> = (0..10u8).collect();
        let source = ChunkSource::new(Cursor::new(data), Arc::new(BufferPool::new(4, 4)));
        let mut t = timings();

        let a = source.next_chunk(&mut t).unwrap().unwrap();
        let b = source.next_chunk(&mut t).unwrap().unwrap();
        let c = source.next_chunk(&mut t).unwrap().unwrap();
        assert_eq!((a.sequence(), a.bytes()), (0, &[0, 1, 2, 3][..]));
        assert_eq!((b.sequence(), b.bytes()), (1, &[4, 5, 6, 7][..]));
        assert_eq!((c.sequence(), c.bytes()), (2, &[8, 9][..]));

        assert!(source.next_chunk(&mut t).unwrap().is_none());
        assert!(source.next_chunk(&mut t).unwrap().is_none());
        assert_eq!(source.chunks_issued(), 3);
        assert_eq!(source.bytes_read(), 10);
        assert!(source.is_exhausted());
    }

    #[test]
    fn test_empty_stream() {
        let source = ChunkSource::new(Cursor::new(Vec::new()), Arc::new(BufferPool::new(4, 1)));
        assert!(source.next_chunk(&mut timings()).unwrap().is_none());
        assert_eq!(source.chunks_issued(), 0);
    }

    #[test]
    fn test_short_reads_still_fill_chunks() {
        let reader = Trickle {
            data: (0..9u8).collect(),
            pos: 0,
            step: 2,
        };
        let source = ChunkSource::new(reader, Arc::new(BufferPool::new(4, 2)));
        let mut t = timings();
        let lens: Vec<usize> = std::iter::from_fn(|| source.next_chunk(&mut t).unwrap())
            .map(|c| c.len())
            .collect();
        assert_eq!(lens, vec![4, 4, 1]);
    }

    #[test]
    fn test_read_error_is_fatal() {
        let source = ChunkSource::new(Broken, Arc::new(BufferPool::new(4, 1)));
        let mut t = timings();
        let err = source.next_chunk(&mut t).unwrap_err();
        assert!(matches!(err, CopyError::SourceRead { sequence: 0, .. }));
        assert!(source.next_chunk(&mut t).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_readers_get_each_chunk_once() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let source = ChunkSource::new(Cursor::new(data.clone()), Arc::new(BufferPool::new(64, 8)));

        let mut chunks: Vec<Chunk> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        let mut t = timings();
                        let mut mine = Vec::new();
                        while let Some(chunk) = source.next_chunk(&mut t).unwrap() {
                            mine.push(chunk);
                        }
                        mine
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        chunks.sort();
        let sequences: Vec<u64> = chunks.iter().map(Chunk::sequence).collect();
        assert_eq!(sequences, (0..64).collect::<Vec<_>>());
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.bytes().to_vec()).collect();
        assert_eq!(joined, data);
    }
}
