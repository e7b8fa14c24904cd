//! Timing counters collected from worker threads

mod timings;

pub use timings::*;
