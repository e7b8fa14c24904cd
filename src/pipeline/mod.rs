//! Concurrent bounded-queue copy pipeline
//!
//! A pool of reader threads pulls numbered chunks from a shared
//! [`ChunkSource`] and pushes them into a [`StagingQueue`]; a pool of
//! writer threads takes them back out strictly in sequence and hands them
//! to a [`ChunkSink`]. The [`Coordinator`] owns all of it for the duration
//! of one run.
//!
//! ```no_run
//! use chunkcopy::config::PipelineConfig;
//! use chunkcopy::pipeline::Coordinator;
//! use std::path::Path;
//!
//! let coordinator = Coordinator::new(PipelineConfig::with_pools(4, 2));
//! let report = coordinator.run(Path::new("in.bin"), Path::new("out.bin")).unwrap();
//! println!("copied {} bytes in {:?}", report.bytes_copied, report.elapsed);
//! ```

mod chunk;
mod coordinator;
mod queue;
mod sink;
mod source;
mod worker;

pub use chunk::*;
pub use coordinator::*;
pub use queue::*;
pub use sink::*;
pub use source::*;

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

// A poisoned lock means a worker panicked; that panic is reported when the
// worker is joined, so the data behind the lock is still used as-is.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}
