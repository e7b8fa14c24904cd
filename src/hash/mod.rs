//! Hashing and integrity verification
//!
//! XXHash3, XXHash64, and BLAKE3 digests used to check a finished copy.

mod integrity;

pub use integrity::*;
