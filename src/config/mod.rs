//! Configuration module for chunkcopy
//!
//! Provides CLI arguments, runtime copy settings, and pipeline tuning.

mod settings;

pub use settings::*;
