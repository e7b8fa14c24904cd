//! # chunkcopy - ordered multi-threaded file copy
//!
//! chunkcopy splits a file into numbered chunks, reads them with a pool of
//! reader threads, stages them in a bounded queue that puts them back in
//! order, and writes them with a pool of writer threads. The destination
//! always receives the bytes in exactly the order the source produced them.
//!
//! ## Features
//!
//! - **Order-recovering staging queue**: min-heap keyed by chunk sequence
//!   with windowed admission, so backpressure can never deadlock
//! - **Independent pool sizes**: any number of readers and writers
//! - **Reusable buffers**: chunk payloads are recycled through a lock-free pool
//! - **Per-stage timings**: lock wait, blocked time, and I/O per worker
//! - **Alternative strategies**: single-threaded and range-partitioned copies
//! - **Integrity verification**: XXHash3, XXHash64, or BLAKE3
//!
//! ## Quick Start
//!
//! ```no_run
//! use chunkcopy::config::{CopyConfig, CopyMode, HashAlgorithm, PipelineConfig};
//! use chunkcopy::copy::CopyEngine;
//! use chunkcopy::progress::ProgressReporter;
//! use std::path::PathBuf;
//!
//! let config = CopyConfig {
//!     source: PathBuf::from("/data/in.bin"),
//!     destination: PathBuf::from("/data/out.bin"),
//!     mode: CopyMode::Pipeline,
//!     pipeline: PipelineConfig::with_pools(4, 2),
//!     verify: Some(HashAlgorithm::XXHash3),
//!     ..Default::default()
//! };
//!
//! let engine = CopyEngine::new(config).with_progress(ProgressReporter::new());
//! let report = engine.execute().unwrap();
//! report.print_summary();
//! ```
//!
//! ## In-memory streams
//!
//! ```
//! use chunkcopy::config::PipelineConfig;
//! use chunkcopy::pipeline::Coordinator;
//! use std::io::Cursor;
//!
//! let data = vec![7u8; 100_000];
//! let config = PipelineConfig {
//!     chunk_size: 32 * 1024,
//!     queue_capacity: 4,
//!     readers: 3,
//!     writers: 2,
//!     timings: false,
//! };
//!
//! let (out, report) = Coordinator::new(config)
//!     .run_streams(Cursor::new(data.clone()), Vec::new(), Some(100_000))
//!     .unwrap();
//! assert_eq!(out, data);
//! assert_eq!(report.chunks, 4);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod copy;
pub mod error;
pub mod hash;
pub mod pipeline;
pub mod progress;
pub mod stats;

// Re-export commonly used types
pub use config::{CopyConfig, CopyMode, HashAlgorithm, PipelineConfig};
pub use copy::{CopyEngine, CopyReport};
pub use error::{CopyError, Result};
pub use pipeline::{Coordinator, PipelineReport, PipelineState};
pub use progress::{ProgressReporter, ProgressSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use chunkcopy::prelude::*;
    //! ```

    pub use crate::config::{CopyConfig, CopyMode, HashAlgorithm, PipelineConfig};
    pub use crate::copy::{copy_direct, CopyEngine, CopyReport, RangedCopier};
    pub use crate::error::{CopyError, Result};
    pub use crate::hash::{hash_file, verify_copy, Digest};
    pub use crate::pipeline::{Coordinator, PipelineReport, PipelineState};
    pub use crate::progress::{ProgressReporter, ProgressSink};
    pub use crate::stats::{TimingReport, WorkerTimings};
}
