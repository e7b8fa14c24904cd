//! Ordered chunk sink shared by the writer pool

use crate::error::{CopyError, Result};
use crate::pipeline::{lock, wait, Chunk};
use crate::stats::{Stage, WorkerTimings};
use std::io::{self, Write};
use std::sync::{Condvar, Mutex};

struct SinkState<W> {
    writer: W,
    next_sequence: u64,
    bytes_written: u64,
    aborted: bool,
}

/// Writes chunks to an output stream strictly in sequence order
///
/// A writer holding chunk `n` waits here until chunk `n - 1` has been
/// written, so extraction from the staging queue and the write itself
/// need not happen under the same lock.
pub struct ChunkSink<W> {
    state: Mutex<SinkState<W>>,
    turn: Condvar,
    expected_len: Option<u64>,
}

impl<W: Write> ChunkSink<W> {
    /// Wrap a writer; `expected_len` is the source length if known up front
    pub fn new(writer: W, expected_len: Option<u64>) -> Self {
        Self {
            state: Mutex::new(SinkState {
                writer,
                next_sequence: 0,
                bytes_written: 0,
                aborted: false,
            }),
            turn: Condvar::new(),
            expected_len,
        }
    }

    /// Write `chunk` once every earlier chunk has been written
    pub fn write(&self, chunk: &Chunk, timings: &mut WorkerTimings) -> Result<()> {
        let sequence = chunk.sequence();
        let mut state = timings.time(Stage::Lock, || lock(&self.state));

        if state.next_sequence != sequence && !state.aborted {
            let started = timings.start();
            while state.next_sequence < sequence && !state.aborted {
                state = wait(&self.turn, state);
            }
            timings.finish(Stage::Blocked, started);
        }
        if state.aborted {
            return Err(CopyError::Aborted);
        }
        if state.next_sequence != sequence {
            return Err(CopyError::SinkWrite {
                sequence,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("chunk already written, sink is at {}", state.next_sequence),
                ),
            });
        }

        let started = timings.start();
        let written = state.writer.write_all(chunk.bytes());
        timings.finish(Stage::Io, started);
        written.map_err(|source| CopyError::SinkWrite { sequence, source })?;

        state.next_sequence += 1;
        state.bytes_written += chunk.len() as u64;
        drop(state);
        self.turn.notify_all();
        Ok(())
    }

    /// Wake every waiting writer and refuse further writes
    pub fn abort(&self) {
        lock(&self.state).aborted = true;
        self.turn.notify_all();
    }

    /// Next sequence the sink will accept
    pub fn next_sequence(&self) -> u64 {
        lock(&self.state).next_sequence
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        lock(&self.state).bytes_written
    }

    /// Source length given at construction, if any
    pub fn expected_len(&self) -> Option<u64> {
        self.expected_len
    }

    /// Whether the known source length has been written in full
    pub fn is_complete(&self) -> bool {
        self.expected_len
            .map(|len| self.bytes_written() >= len)
            .unwrap_or(false)
    }

    /// Flush and hand back the writer along with the byte count
    pub fn finish(self) -> Result<(W, u64)> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let SinkState {
            mut writer,
            next_sequence,
            bytes_written,
            ..
        } = state;
        writer.flush().map_err(|source| CopyError::SinkWrite {
            sequence: next_sequence,
            source,
        })?;
        Ok((writer, bytes_written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerRole;
    use std::thread;
    use std::time::Duration;

    fn timings() -> WorkerTimings {
        WorkerTimings::new(WorkerRole::Writer, 0, false)
    }

    fn chunk(seq: u64, byte: u8, len: usize) -> Chunk {
        Chunk::new(seq, vec![byte; len], len)
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_in_order_writes() {
        let sink = ChunkSink::new(Vec::new(), Some(5));
        sink.write(&chunk(0, b'a', 3), &mut timings()).unwrap();
        assert!(!sink.is_complete());
        sink.write(&chunk(1, b'b', 2), &mut timings()).unwrap();
        assert!(sink.is_complete());
        assert_eq!(sink.next_sequence(), 2);

        let (out, bytes) = sink.finish().unwrap();
        assert_eq!(out, b"aaabb");
        assert_eq!(bytes, 5);
    }

    #[test]
    fn test_later_chunk_waits_for_its_turn() {
        let sink = ChunkSink::new(Vec::new(), None);
        thread::scope(|s| {
            s.spawn(|| sink.write(&chunk(1, b'y', 1), &mut timings()).unwrap());
            thread::sleep(Duration::from_millis(30));
            assert_eq!(sink.bytes_written(), 0);
            sink.write(&chunk(0, b'x', 1), &mut timings()).unwrap();
        });
        let (out, _) = sink.finish().unwrap();
        assert_eq!(out, b"xy");
    }

    #[test]
    fn test_duplicate_sequence_rejected() {
        let sink = ChunkSink::new(Vec::new(), None);
        sink.write(&chunk(0, b'x', 1), &mut timings()).unwrap();
        let err = sink.write(&chunk(0, b'x', 1), &mut timings()).unwrap_err();
        assert!(matches!(err, CopyError::SinkWrite { sequence: 0, .. }));
    }

    #[test]
    fn test_abort_releases_waiters() {
        let sink = ChunkSink::new(Vec::new(), None);
        thread::scope(|s| {
            let waiter = s.spawn(|| sink.write(&chunk(3, b'z', 1), &mut timings()));
            thread::sleep(Duration::from_millis(30));
            sink.abort();
            assert!(matches!(waiter.join().unwrap(), Err(CopyError::Aborted)));
        });
    }

    #[test]
    fn test_write_error_names_chunk() {
        let sink = ChunkSink::new(FailingWriter, None);
        let err = sink.write(&chunk(0, 0, 4), &mut timings()).unwrap_err();
        assert_eq!(err.kind(), "SinkWriteError");
        assert_eq!(sink.bytes_written(), 0);
    }
}
