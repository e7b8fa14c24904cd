//! Post-copy integrity verification
//!
//! Source and destination are hashed independently after the copy has
//! finished; a mismatch is reported as [`CopyError::IntegrityMismatch`].

use crate::config::HashAlgorithm;
use crate::error::{CopyError, IoResultExt, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::time::{Duration, Instant};

/// Read buffer used when hashing files
const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Digest of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    /// Algorithm that produced the digest
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub hex: String,
    /// Bytes hashed
    pub size: u64,
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.hex)
    }
}

/// Streaming hasher over the supported algorithms
pub enum Hasher {
    /// XXHash3 128-bit
    XXHash3(Box<xxhash_rust::xxh3::Xxh3>),
    /// XXHash64
    XXHash64(xxhash_rust::xxh64::Xxh64),
    /// BLAKE3
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    /// Create a hasher for `algorithm`
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::XXHash3 => Self::XXHash3(Box::new(xxhash_rust::xxh3::Xxh3::new())),
            HashAlgorithm::XXHash64 => Self::XXHash64(xxhash_rust::xxh64::Xxh64::new(0)),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Algorithm this hasher computes
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::XXHash3(_) => HashAlgorithm::XXHash3,
            Self::XXHash64(_) => HashAlgorithm::XXHash64,
            Self::Blake3(_) => HashAlgorithm::Blake3,
        }
    }

    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::XXHash3(h) => h.update(data),
            Self::XXHash64(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finish and return the lowercase hex digest
    pub fn finalize(self) -> String {
        match self {
            Self::XXHash3(h) => format!("{:032x}", h.digest128()),
            Self::XXHash64(h) => format!("{:016x}", h.digest()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Hash everything `reader` yields
pub fn hash_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> std::io::Result<Digest> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        size += n as u64;
    }

    Ok(Digest {
        algorithm,
        hex: hasher.finalize(),
        size,
    })
}

/// Hash an in-memory buffer
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> Digest {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    Digest {
        algorithm,
        hex: hasher.finalize(),
        size: data.len() as u64,
    }
}

/// Hash the file at `path`
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<Digest> {
    let file = File::open(path).with_path(path)?;
    hash_reader(file, algorithm).with_path(path)
}

/// Outcome of a successful verification
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    /// Digest shared by source and destination
    pub digest: Digest,
    /// Time spent hashing both files
    #[serde(serialize_with = "crate::stats::serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

/// Check that `destination` holds exactly the bytes of `source`
///
/// Both files are hashed concurrently on the rayon pool.
pub fn verify_copy(source: &Path, destination: &Path, algorithm: HashAlgorithm) -> Result<Verification> {
    let started = Instant::now();
    let (expected, actual) = rayon::join(
        || hash_file(source, algorithm),
        || hash_file(destination, algorithm),
    );
    let (expected, actual) = (expected?, actual?);

    if expected.hex != actual.hex || expected.size != actual.size {
        return Err(CopyError::IntegrityMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    tracing::debug!("verified {} ({} bytes)", expected, expected.size);
    Ok(Verification {
        digest: expected,
        elapsed: started.elapsed(),
    })
}
