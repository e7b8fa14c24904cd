//! Bounded, order-recovering staging queue
//!
//! Readers finish chunks in whatever order the scheduler lets them and
//! insert them here; writers only ever take the chunk whose sequence is
//! next in line. Resident chunks sit in a min-heap keyed by sequence.
//!
//! Admission is windowed: a chunk may enter only if its sequence is below
//! `next_expected + capacity`. Every resident chunk is therefore inside
//! that window, so at most `capacity` chunks are resident, and the chunk
//! writers are waiting for can always get in. A plain size bound would
//! let later chunks fill the queue while the head-of-line chunk is stuck
//! in a reader's hands.
//!
//! All state, including the two lifecycle flags, is guarded by one mutex.
//! Blocking is done on two condition variables, never by polling.

use crate::error::{CopyError, Result};
use crate::pipeline::{lock, wait, Chunk};
use crate::stats::{Stage, WorkerTimings};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};

/// Counters describing how the queue was used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Configured capacity
    pub capacity: usize,
    /// Most chunks ever resident at once
    pub peak_resident: usize,
    /// Chunks inserted
    pub pushed: u64,
    /// Chunks extracted
    pub popped: u64,
    /// Times a producer had to wait for room
    pub producer_waits: u64,
    /// Times a consumer had to wait for the head-of-line chunk
    pub consumer_waits: u64,
}

struct QueueState {
    heap: BinaryHeap<Reverse<Chunk>>,
    next_expected: u64,
    active_producers: usize,
    producing_active: bool,
    consuming_active: bool,
    shutdown: bool,
    stats: QueueStats,
}

impl QueueState {
    fn head_sequence(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(chunk)| chunk.sequence())
    }

    fn head_is(&self, sequence: u64) -> bool {
        self.head_sequence() == Some(sequence)
    }

    fn admits(&self, sequence: u64) -> bool {
        sequence < self.next_expected.saturating_add(self.stats.capacity as u64)
    }

    fn take_head(&mut self) -> Option<Chunk> {
        let Reverse(chunk) = self.heap.pop()?;
        self.next_expected = chunk.sequence() + 1;
        self.stats.popped += 1;
        Some(chunk)
    }
}

/// The staging area between the reader and writer pools
pub struct StagingQueue {
    state: Mutex<QueueState>,
    /// Signalled when room opens up in the admission window
    not_full: Condvar,
    /// Signalled when the head-of-line chunk may have arrived
    ready: Condvar,
}

impl StagingQueue {
    /// Create a queue holding at most `capacity` chunks, fed by `producers` readers
    pub fn new(capacity: usize, producers: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_expected: 0,
                active_producers: producers,
                producing_active: producers > 0,
                consuming_active: true,
                shutdown: false,
                stats: QueueStats {
                    capacity,
                    ..Default::default()
                },
            }),
            not_full: Condvar::new(),
            ready: Condvar::new(),
        }
    }

    /// Insert a chunk, blocking while it falls outside the admission window
    ///
    /// Fails only if the queue was shut down while waiting.
    pub fn push(&self, chunk: Chunk, timings: &mut WorkerTimings) -> Result<()> {
        let mut state = timings.time(Stage::Lock, || lock(&self.state));

        if !state.admits(chunk.sequence()) && !state.shutdown {
            state.stats.producer_waits += 1;
            let started = timings.start();
            while !state.admits(chunk.sequence()) && !state.shutdown {
                state = wait(&self.not_full, state);
            }
            timings.finish(Stage::Blocked, started);
        }
        if state.shutdown {
            return Err(CopyError::Aborted);
        }

        let is_head = chunk.sequence() == state.next_expected;
        state.heap.push(Reverse(chunk));
        state.stats.pushed += 1;
        state.stats.peak_resident = state.stats.peak_resident.max(state.heap.len());
        drop(state);

        // Only the head-of-line chunk can unblock a writer.
        if is_head {
            self.ready.notify_one();
        }
        Ok(())
    }

    /// Remove the chunk with sequence `expected`, blocking until it is the head
    ///
    /// Returns `None` when the chunk can never arrive: the queue was shut
    /// down, every producer has finished and the queue holds nothing for
    /// `expected`, or `expected` is not the next sequence in line. The last
    /// case also covers the cursor moving past `expected` while waiting.
    pub fn pop_in_order(&self, expected: u64, timings: &mut WorkerTimings) -> Option<Chunk> {
        let state = timings.time(Stage::Lock, || lock(&self.state));
        self.pop_where(state, Some(expected), timings)
    }

    /// Remove the next chunk in line, whichever sequence that is
    ///
    /// Extraction and advancing the cursor are one step under the queue
    /// lock, so two writers can never both claim the same sequence.
    pub fn pop_next(&self, timings: &mut WorkerTimings) -> Option<Chunk> {
        let state = timings.time(Stage::Lock, || lock(&self.state));
        self.pop_where(state, None, timings)
    }

    /// Shared body of the pops; `expected` of `None` means whatever is next
    fn pop_where(
        &self,
        mut state: std::sync::MutexGuard<'_, QueueState>,
        expected: Option<u64>,
        timings: &mut WorkerTimings,
    ) -> Option<Chunk> {
        let mut waited = false;
        let started = timings.start();

        loop {
            if state.shutdown {
                break;
            }
            let wanted = state.next_expected;
            if expected.is_some_and(|e| e != wanted) {
                drop(state);
                if waited {
                    timings.finish(Stage::Blocked, started);
                }
                // Pass on a wakeup this call may have absorbed.
                self.ready.notify_one();
                return None;
            }
            if state.head_is(wanted) {
                let chunk = state.take_head();
                drop(state);
                if waited {
                    timings.finish(Stage::Blocked, started);
                }
                // The window slid by one; a producer may now fit.
                self.not_full.notify_all();
                // Another writer may be waiting on the new head.
                self.ready.notify_one();
                return chunk;
            }
            if !state.producing_active || !state.consuming_active {
                if state.heap.is_empty() && state.consuming_active {
                    state.consuming_active = false;
                    tracing::debug!("staging queue drained after {} chunks", state.stats.popped);
                    drop(state);
                    self.ready.notify_all();
                    self.not_full.notify_all();
                    if waited {
                        timings.finish(Stage::Blocked, started);
                    }
                    return None;
                }
                if !state.consuming_active {
                    break;
                }
            }
            if !waited {
                state.stats.consumer_waits += 1;
                waited = true;
            }
            state = wait(&self.ready, state);
        }

        drop(state);
        if waited {
            timings.finish(Stage::Blocked, started);
        }
        None
    }

    /// Record that one reader has seen end-of-stream
    ///
    /// The last reader to finish flips `producing_active` and wakes every
    /// waiter so writers can drain and exit.
    pub fn producer_done(&self) {
        let mut state = lock(&self.state);
        state.active_producers = state.active_producers.saturating_sub(1);
        if state.active_producers == 0 && state.producing_active {
            state.producing_active = false;
            tracing::debug!("all producers finished, {} chunks pushed", state.stats.pushed);
            drop(state);
            self.ready.notify_all();
            self.not_full.notify_all();
        }
    }

    /// Stop the queue: blocked pushes fail and blocked pops return `None`
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        drop(state);
        self.ready.notify_all();
        self.not_full.notify_all();
    }

    /// Hand back every resident chunk (used after shutdown to recycle buffers)
    pub fn drain(&self) -> Vec<Chunk> {
        let mut state = lock(&self.state);
        std::mem::take(&mut state.heap)
            .into_iter()
            .map(|Reverse(chunk)| chunk)
            .collect()
    }

    /// Chunks currently resident
    pub fn len(&self) -> usize {
        lock(&self.state).heap.len()
    }

    /// True when no chunk is resident
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next sequence writers will extract
    pub fn next_expected(&self) -> u64 {
        lock(&self.state).next_expected
    }

    /// At least one reader may still produce
    pub fn producing_active(&self) -> bool {
        lock(&self.state).producing_active
    }

    /// Writers still have work
    pub fn consuming_active(&self) -> bool {
        lock(&self.state).consuming_active
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shutdown(&self) -> bool {
        lock(&self.state).shutdown
    }

    /// Usage counters
    pub fn stats(&self) -> QueueStats {
        lock(&self.state).stats
    }
}
