//! Progress reporting module
//!
//! Provides the per-write progress hook and an indicatif-based reporter
//! with throughput and ETA display.

mod reporter;

pub use reporter::*;
