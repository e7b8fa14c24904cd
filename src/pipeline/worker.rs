//! Reader and writer thread bodies

use crate::error::{CopyError, WorkerRole};
use crate::pipeline::{lock, BufferPool, ChunkSink, ChunkSource, StagingQueue};
use crate::progress::ProgressSink;
use crate::stats::WorkerTimings;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;

/// Everything the workers of one run share
///
/// Owned by the coordinator for the duration of a run and lent to every
/// worker by reference.
pub(crate) struct Shared<R, W> {
    pub source: ChunkSource<R>,
    pub queue: StagingQueue,
    pub sink: ChunkSink<W>,
    pub pool: Arc<BufferPool>,
    pub progress: Option<Arc<dyn ProgressSink>>,
    failure: Mutex<Option<CopyError>>,
}

impl<R, W> Shared<R, W> {
    pub fn new(
        source: ChunkSource<R>,
        queue: StagingQueue,
        sink: ChunkSink<W>,
        pool: Arc<BufferPool>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Self {
        Self {
            source,
            queue,
            sink,
            pool,
            progress,
            failure: Mutex::new(None),
        }
    }

    /// First failure recorded during the run, if any
    pub fn take_failure(&self) -> Option<CopyError> {
        lock(&self.failure).take()
    }

    pub fn has_failed(&self) -> bool {
        lock(&self.failure).is_some()
    }
}

impl<R: Read, W: Write> Shared<R, W> {
    /// Record `err` and stop every other worker
    ///
    /// The first real error wins. `Aborted` is only kept if nothing else
    /// was ever recorded.
    pub fn fail(&self, err: CopyError) {
        {
            let mut slot = lock(&self.failure);
            let replace = match slot.as_ref() {
                None => true,
                Some(existing) => existing.is_aborted() && !err.is_aborted(),
            };
            if replace {
                if !err.is_aborted() {
                    tracing::debug!("pipeline failed: {}", err);
                }
                *slot = Some(err);
            }
        }
        self.queue.shutdown();
        self.sink.abort();
    }
}

/// Runs teardown for a worker even if its body panics
struct ExitGuard<'a, R: Read, W: Write> {
    shared: &'a Shared<R, W>,
    role: WorkerRole,
    index: usize,
}

impl<R: Read, W: Write> Drop for ExitGuard<'_, R, W> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.fail(CopyError::WorkerJoin {
                role: self.role,
                index: self.index,
            });
        }
        if self.role == WorkerRole::Reader {
            self.shared.queue.producer_done();
        }
        tracing::debug!("{} {} exiting", self.role, self.index);
    }
}

/// Pull chunks from the source and stage them until end-of-stream
pub(crate) fn reader_loop<R: Read, W: Write>(
    shared: &Shared<R, W>,
    index: usize,
    timed: bool,
) -> WorkerTimings {
    let mut timings = WorkerTimings::new(WorkerRole::Reader, index, timed);
    let _guard = ExitGuard {
        shared,
        role: WorkerRole::Reader,
        index,
    };

    loop {
        let chunk = match shared.source.next_chunk(&mut timings) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                shared.fail(err);
                break;
            }
        };
        let len = chunk.len();
        if let Err(err) = shared.queue.push(chunk, &mut timings) {
            shared.fail(err);
            break;
        }
        timings.record_chunk(len);
    }

    timings
}

/// Take chunks off the queue in sequence and write them until drained
pub(crate) fn writer_loop<R: Read, W: Write>(
    shared: &Shared<R, W>,
    index: usize,
    timed: bool,
) -> WorkerTimings {
    let mut timings = WorkerTimings::new(WorkerRole::Writer, index, timed);
    let _guard = ExitGuard {
        shared,
        role: WorkerRole::Writer,
        index,
    };

    while let Some(chunk) = shared.queue.pop_next(&mut timings) {
        let sequence = chunk.sequence();
        let len = chunk.len();
        let written = shared.sink.write(&chunk, &mut timings);
        shared.pool.release(chunk.into_buffer());

        if let Err(err) = written {
            shared.fail(err);
            break;
        }
        timings.record_chunk(len);
        if let Some(progress) = &shared.progress {
            progress.chunk_written(sequence, len as u64);
        }
    }

    timings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    fn shared(data: Vec<u8>, chunk: usize, capacity: usize, readers: usize) -> Shared<Cursor<Vec<u8>>, Vec<u8>> {
        let pool = Arc::new(BufferPool::new(chunk, capacity + 2));
        Shared::new(
            ChunkSource::new(Cursor::new(data), pool.clone()),
            StagingQueue::new(capacity, readers),
            ChunkSink::new(Vec::new(), None),
            pool,
            None,
        )
    }

    #[test]
    fn test_single_reader_then_writer() {
        let data: Vec<u8> = (0..50u8).collect();
        let shared = shared(data.clone(), 8, 16, 1);

        let read = reader_loop(&shared, 0, false);
        assert_eq!(read.chunks, 7);
        assert!(!shared.queue.producing_active());

        let written = writer_loop(&shared, 0, false);
        assert_eq!(written.bytes, 50);
        assert!(!shared.queue.consuming_active());
        assert!(shared.take_failure().is_none());

        let Shared { sink, .. } = shared;
        assert_eq!(sink.finish().unwrap().0, data);
    }

    #[test]
    fn test_first_real_error_wins() {
        let shared = shared(Vec::new(), 4, 2, 1);
        shared.fail(CopyError::Aborted);
        shared.fail(CopyError::SinkWrite {
            sequence: 2,
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        });
        shared.fail(CopyError::SourceRead {
            sequence: 5,
            source: io::Error::new(io::ErrorKind::Other, "late"),
        });

        assert!(shared.queue.is_shutdown());
        assert!(shared.has_failed());
        let err = shared.take_failure().unwrap();
        assert!(matches!(err, CopyError::SinkWrite { sequence: 2, .. }));
    }

    #[test]
    fn test_panicking_worker_records_join_error() {
        let shared = shared(vec![1; 4], 4, 2, 1);
        thread::scope(|s| {
            let handle = s.spawn(|| {
                let _guard = ExitGuard {
                    shared: &shared,
                    role: WorkerRole::Reader,
                    index: 7,
                };
                panic!("boom");
            });
            assert!(handle.join().is_err());
        });

        assert!(!shared.queue.producing_active());
        let err = shared.take_failure().unwrap();
        assert!(matches!(
            err,
            CopyError::WorkerJoin {
                role: WorkerRole::Reader,
                index: 7
            }
        ));
    }
}
