//! Error types for chunkcopy
//!
//! Every failure inside a copy is fatal to that copy. Workers record the
//! first error they hit, the coordinator joins every other worker, and the
//! recorded error is what the caller sees.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which worker pool a thread belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    /// Pulls chunks from the source and pushes them into the staging queue
    Reader,
    /// Pulls chunks from the staging queue in order and writes them to the sink
    Writer,
    /// Copies a fixed byte range (range-partitioned mode)
    Range,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reader => write!(f, "reader"),
            Self::Writer => write!(f, "writer"),
            Self::Range => write!(f, "range"),
        }
    }
}

/// Main error type for chunkcopy operations
#[derive(Error, Debug)]
pub enum CopyError {
    /// The source could not be opened
    #[error("cannot open source '{path}': {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination could not be created or truncated
    #[error("cannot open destination '{path}': {source}")]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the chunk with the given sequence number failed
    #[error("read failed at chunk {sequence}: {source}")]
    SourceRead {
        sequence: u64,
        #[source]
        source: std::io::Error,
    },

    /// Writing the chunk with the given sequence number failed
    #[error("write failed at chunk {sequence}: {source}")]
    SinkWrite {
        sequence: u64,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread could not be started
    #[error("failed to spawn {role} thread {index}: {source}")]
    WorkerSpawn {
        role: WorkerRole,
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked
    #[error("failed to join {role} thread {index}")]
    WorkerJoin { role: WorkerRole, index: usize },

    /// The pipeline was shut down because another worker failed
    #[error("pipeline aborted")]
    Aborted,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Source and destination hashes differ after the copy
    #[error("integrity check failed: source {expected}, destination {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// I/O error outside the copy loop (metadata, verification reads)
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CopyError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Short name of the error kind, used when reporting failures to the user
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceOpen { .. } => "SourceOpenError",
            Self::SinkOpen { .. } => "SinkOpenError",
            Self::SourceRead { .. } => "SourceReadError",
            Self::SinkWrite { .. } => "SinkWriteError",
            Self::WorkerSpawn { .. } => "WorkerSpawnError",
            Self::WorkerJoin { .. } => "WorkerJoinError",
            Self::Aborted => "Aborted",
            Self::Config(_) => "ConfigError",
            Self::IntegrityMismatch { .. } => "IntegrityMismatch",
            Self::Io { .. } => "IoError",
        }
    }

    /// True for the secondary error a worker reports after observing shutdown
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::SourceOpen { path, .. } | Self::SinkOpen { path, .. } | Self::Io { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

/// Result type alias for chunkcopy operations
pub type Result<T> = std::result::Result<T, CopyError>;

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| CopyError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_with_path() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = CopyError::io("/test/path", io_err);
        assert_eq!(err.path(), Some(&PathBuf::from("/test/path")));
        assert_eq!(err.kind(), "IoError");
    }

    #[test]
    fn test_taxonomy_kinds() {
        let open = CopyError::SourceOpen {
            path: PathBuf::from("/missing"),
            source: io::Error::new(io::ErrorKind::NotFound, "nope"),
        };
        assert_eq!(open.kind(), "SourceOpenError");
        assert!(open.to_string().contains("/missing"));

        let join = CopyError::WorkerJoin {
            role: WorkerRole::Writer,
            index: 3,
        };
        assert_eq!(join.kind(), "WorkerJoinError");
        assert_eq!(join.to_string(), "failed to join writer thread 3");
        assert!(join.path().is_none());
    }

    #[test]
    fn test_with_path_extension() {
        let res: io::Result<()> = Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let err = res.with_path("/etc/shadow").unwrap_err();
        assert_eq!(err.path(), Some(&PathBuf::from("/etc/shadow")));
        assert!(!err.is_aborted());
        assert!(CopyError::Aborted.is_aborted());
    }
}
