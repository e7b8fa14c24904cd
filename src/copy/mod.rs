//! Copy strategies and the engine that dispatches between them
//!
//! - [`copy_direct`]: one thread, read then write
//! - [`RangedCopier`]: each worker copies its own byte range
//! - [`crate::pipeline::Coordinator`]: reader pool, ordered queue, writer pool

mod direct;
mod engine;
mod ranged;

pub use direct::*;
pub use engine::*;
pub use ranged::*;

use crate::stats::{serialize_millis, TimingReport};
use serde::Serialize;
use std::time::Duration;

/// Counters returned by the direct and ranged strategies
#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyStats {
    /// Bytes written to the destination
    pub bytes: u64,
    /// Read/write steps taken
    pub chunks: u64,
    /// Wall time of the copy
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
    /// Per-worker timings, when enabled
    pub timings: Option<TimingReport>,
}
