//! Configuration settings for chunkcopy
//!
//! Defines the CLI arguments, the runtime copy configuration, and the
//! tuning knobs of the staging pipeline.

use crate::error::{CopyError, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default bytes per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Default maximum number of chunks resident in the staging queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Largest accepted chunk size (1 GiB)
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024 * 1024;

/// chunkcopy - ordered multi-threaded file copy
#[derive(Parser, Debug, Clone)]
#[command(name = "chunkcopy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy a file through concurrent reader and writer pools")]
#[command(long_about = r#"
chunkcopy copies one file to another using a pool of reader threads and a
pool of writer threads connected by a bounded, order-recovering queue.

Modes:
  pipeline  readers -> staging queue -> writers (default)
  direct    single-threaded read/write loop
  ranged    each thread copies its own contiguous byte range

Examples:
  chunkcopy in.bin out.bin                         # pipeline with auto-sized pools
  chunkcopy in.bin out.bin -r 4 -w 2 --timings     # explicit pools, print counters
  chunkcopy in.bin out.bin --mode ranged -t 8      # lock-free range copy
"#)]
pub struct CliArgs {
    /// Source file
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination file (created or truncated)
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,

    /// Copy strategy
    #[arg(short = 'm', long, value_enum, default_value = "pipeline")]
    pub mode: CopyMode,

    /// Threads per pool (0 = auto-detect)
    #[arg(short = 't', long, default_value = "0", value_name = "NUM")]
    pub threads: usize,

    /// Reader threads (overrides --threads)
    #[arg(short = 'r', long, value_name = "NUM")]
    pub readers: Option<usize>,

    /// Writer threads (overrides --threads)
    #[arg(short = 'w', long, value_name = "NUM")]
    pub writers: Option<usize>,

    /// Bytes per chunk (e.g., 32K, 1M)
    #[arg(short = 'b', long, default_value = "32K", value_name = "SIZE")]
    pub chunk_size: String,

    /// Maximum chunks resident in the staging queue
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_name = "NUM")]
    pub queue_capacity: usize,

    /// Print elapsed time and per-stage timing counters
    #[arg(long)]
    pub timings: bool,

    /// Verify the destination against the source after copying
    #[arg(long, value_enum, value_name = "ALGO")]
    pub verify: Option<HashAlgorithm>,

    /// Show a progress bar
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Output format for the final report
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

/// Copy strategy
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    /// Reader pool -> ordered staging queue -> writer pool
    #[default]
    Pipeline,
    /// Single-threaded read/write loop
    Direct,
    /// Each worker copies a fixed byte range at its own offset
    Ranged,
}

impl CopyMode {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Direct => "direct",
            Self::Ranged => "ranged",
        }
    }
}

/// Hash algorithm for integrity verification
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// XXHash3 - Ultra fast, non-cryptographic (128-bit)
    #[default]
    #[value(name = "xxhash3")]
    XXHash3,
    /// XXHash64 - Fast, non-cryptographic (64-bit)
    #[value(name = "xxhash64")]
    XXHash64,
    /// BLAKE3 - Fast and cryptographically secure
    #[value(name = "blake3")]
    Blake3,
}

impl HashAlgorithm {
    /// Get the output size in bytes
    pub fn output_size(&self) -> usize {
        match self {
            Self::XXHash3 => 16,
            Self::XXHash64 => 8,
            Self::Blake3 => 32,
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::XXHash3 => "XXHash3",
            Self::XXHash64 => "XXHash64",
            Self::Blake3 => "BLAKE3",
        }
    }
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Tuning of the staging pipeline
///
/// Fixed once the pipeline starts running; only the coordinator reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bytes per chunk
    pub chunk_size: usize,
    /// Maximum chunks resident in the staging queue
    pub queue_capacity: usize,
    /// Reader thread count
    pub readers: usize,
    /// Writer thread count
    pub writers: usize,
    /// Record per-stage timing counters
    pub timings: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            readers: 1,
            writers: 1,
            timings: false,
        }
    }
}

impl PipelineConfig {
    /// Create a config with the given pool sizes and default chunking
    pub fn with_pools(readers: usize, writers: usize) -> Self {
        Self {
            readers,
            writers,
            ..Default::default()
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        validate_chunk_size(self.chunk_size)?;
        if self.queue_capacity == 0 {
            return Err(CopyError::config("queue capacity must be at least 1"));
        }
        if self.readers == 0 {
            return Err(CopyError::config("at least one reader thread is required"));
        }
        if self.writers == 0 {
            return Err(CopyError::config("at least one writer thread is required"));
        }
        Ok(())
    }

    /// Number of chunk buffers that can be alive at once
    ///
    /// Every resident chunk, plus one held by each reader waiting to push
    /// and one held by each writer waiting for its turn at the sink.
    pub fn buffer_budget(&self) -> usize {
        self.queue_capacity
            .saturating_add(self.readers)
            .saturating_add(self.writers)
    }
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub destination: PathBuf,
    /// Copy strategy
    pub mode: CopyMode,
    /// Pipeline tuning; `chunk_size` and `timings` also apply to the other modes
    pub pipeline: PipelineConfig,
    /// Worker count for ranged mode
    pub threads: usize,
    /// Hash algorithm for verification
    pub verify: Option<HashAlgorithm>,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            mode: CopyMode::Pipeline,
            pipeline: PipelineConfig::default(),
            threads: 1,
            verify: None,
        }
    }
}

impl CopyConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let threads = if args.threads == 0 {
            num_cpus::get()
        } else {
            args.threads
        };

        let chunk_size = parse_size(&args.chunk_size)
            .map_err(|e| CopyError::config(format!("invalid chunk size: {}", e)))?;

        let chunk_size = usize::try_from(chunk_size)
            .map_err(|_| CopyError::config(format!("chunk size too large: {}", args.chunk_size)))?;

        let pipeline = PipelineConfig {
            chunk_size,
            queue_capacity: args.queue_capacity,
            readers: args.readers.unwrap_or(threads),
            writers: args.writers.unwrap_or(threads),
            timings: args.timings,
        };

        let config = Self {
            source: args.source.clone(),
            destination: args.destination.clone(),
            mode: args.mode,
            pipeline,
            threads,
            verify: args.verify,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the settings relevant to the selected mode
    pub fn validate(&self) -> Result<()> {
        if self.source == self.destination {
            return Err(CopyError::config(format!(
                "source and destination are the same: {}",
                self.source.display()
            )));
        }
        match self.mode {
            CopyMode::Pipeline => self.pipeline.validate(),
            CopyMode::Direct | CopyMode::Ranged => {
                validate_chunk_size(self.pipeline.chunk_size)?;
                if self.mode == CopyMode::Ranged && self.threads == 0 {
                    return Err(CopyError::config("at least one range thread is required"));
                }
                Ok(())
            }
        }
    }
}

/// Check that a chunk size is in `1..=MAX_CHUNK_SIZE`
pub fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(CopyError::config("chunk size must be at least 1 byte"));
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(CopyError::config(format!(
            "chunk size {} exceeds the maximum of {}",
            chunk_size, MAX_CHUNK_SIZE
        )));
    }
    Ok(())
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(|c| c == 'G' || c == 'B'), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(|c| c == 'M' || c == 'B'), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(|c| c == 'K' || c == 'B'), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if !num.is_finite() {
        return Err(format!("Invalid number: {}", num_str));
    }
    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    let bytes = num * multiplier as f64;
    if bytes >= u64::MAX as f64 {
        return Err(format!("Size out of range: {}", size));
    }
    Ok(bytes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["chunkcopy", "in.bin", "out.bin"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("32K").unwrap(), 32 * 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_parse_size_rejects_non_finite() {
        assert!(parse_size("inf").is_err());
        assert!(parse_size("-inf").is_err());
        assert!(parse_size("NaN").is_err());
        assert!(parse_size("infinityG").is_err());
        assert!(parse_size("1e30").is_err());
        assert_eq!(parse_size("1e3").unwrap(), 1000);
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        for size in ["inf", "2G", "1e30", "1e12K"] {
            let err = CopyConfig::from_cli(&args(&["-b", size])).unwrap_err();
            assert_eq!(err.kind(), "ConfigError", "chunk size {}", size);
        }
        for mode in ["direct", "ranged"] {
            let err = CopyConfig::from_cli(&args(&["--mode", mode, "-b", "2G"])).unwrap_err();
            assert_eq!(err.kind(), "ConfigError");
        }
        let config = CopyConfig::from_cli(&args(&["-b", "1G"])).unwrap();
        assert_eq!(config.pipeline.chunk_size, MAX_CHUNK_SIZE);

        let config = PipelineConfig {
            chunk_size: MAX_CHUNK_SIZE + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CopyError::Config(_))));
    }

    #[test]
    fn test_cli_defaults() {
        let config = CopyConfig::from_cli(&args(&["-t", "3"])).unwrap();
        assert_eq!(config.mode, CopyMode::Pipeline);
        assert_eq!(config.pipeline.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.pipeline.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.pipeline.readers, 3);
        assert_eq!(config.pipeline.writers, 3);
        assert!(!config.pipeline.timings);
    }

    #[test]
    fn test_cli_pool_overrides() {
        let config =
            CopyConfig::from_cli(&args(&["-t", "2", "-r", "5", "--chunk-size", "4K", "--timings"]))
                .unwrap();
        assert_eq!(config.pipeline.readers, 5);
        assert_eq!(config.pipeline.writers, 2);
        assert_eq!(config.pipeline.chunk_size, 4096);
        assert!(config.pipeline.timings);
    }

    #[test]
    fn test_validation_rejects_zero() {
        assert!(CopyConfig::from_cli(&args(&["--queue-capacity", "0"])).is_err());
        assert!(CopyConfig::from_cli(&args(&["-w", "0"])).is_err());
        assert!(CopyConfig::from_cli(&args(&["-b", "0"])).is_err());

        let config = PipelineConfig {
            readers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CopyError::Config(_))));
    }

    #[test]
    fn test_same_path_rejected() {
        let config = CopyConfig {
            source: PathBuf::from("a"),
            destination: PathBuf::from("a"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_budget() {
        let config = PipelineConfig {
            queue_capacity: 4,
            readers: 3,
            writers: 2,
            ..Default::default()
        };
        assert_eq!(config.buffer_budget(), 9);

        let huge = PipelineConfig {
            queue_capacity: usize::MAX,
            ..config
        };
        assert_eq!(huge.buffer_budget(), usize::MAX);
    }

    #[test]
    fn test_hash_algorithm() {
        assert_eq!(HashAlgorithm::XXHash3.output_size(), 16);
        assert_eq!(HashAlgorithm::Blake3.output_size(), 32);
        assert_eq!(HashAlgorithm::XXHash64.name(), "XXHash64");
    }
}
