//! Copy engine
//!
//! Runs the configured strategy, drives the progress display, and
//! optionally verifies the result.

use crate::config::{CopyConfig, CopyMode};
use crate::copy::{copy_direct, RangedCopier};
use crate::error::Result;
use crate::hash::{verify_copy, Verification};
use crate::pipeline::{Coordinator, PipelineState, QueueStats};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::stats::{serialize_millis, TimingReport};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a whole copy operation
#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    /// Strategy used
    pub mode: CopyMode,
    /// Bytes written to the destination
    pub bytes_copied: u64,
    /// Chunks moved
    pub chunks: u64,
    /// Total duration, verification included
    #[serde(serialize_with = "serialize_millis", rename = "duration_ms")]
    pub duration: Duration,
    /// Copy throughput in bytes/second
    pub throughput: f64,
    /// Final pipeline state (pipeline mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PipelineState>,
    /// Staging queue counters (pipeline mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
    /// Per-worker timings, when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings: Option<TimingReport>,
    /// Verification outcome, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
}

impl CopyReport {
    /// Print summary to console
    pub fn print_summary(&self) {
        let rounded = Duration::from_millis(self.duration.as_millis() as u64);
        println!("\n=== Copy Summary ===");
        println!("Mode:            {}", self.mode.name());
        println!(
            "Bytes copied:    {}",
            humansize::format_size(self.bytes_copied, humansize::BINARY)
        );
        println!("Chunks:          {}", self.chunks);
        println!("Duration:        {}", humantime::format_duration(rounded));
        println!(
            "Throughput:      {}/s",
            humansize::format_size(self.throughput as u64, humansize::BINARY)
        );

        if let Some(queue) = &self.queue {
            println!("\nStaging queue:");
            println!("  Capacity:        {}", queue.capacity);
            println!("  Peak resident:   {}", queue.peak_resident);
            println!("  Producer waits:  {}", queue.producer_waits);
            println!("  Consumer waits:  {}", queue.consumer_waits);
        }

        if let Some(verification) = &self.verification {
            println!("\nVerification:");
            println!("  Digest:    {}", verification.digest);
            println!("  Took:      {:.2?}", verification.elapsed);
        }

        if let Some(timings) = &self.timings {
            println!("\n----COPYING STATS----");
            timings.print();
        }
    }

    /// Render the report as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Main copy engine
pub struct CopyEngine {
    config: CopyConfig,
    progress: Option<Arc<ProgressReporter>>,
}

impl CopyEngine {
    /// Create a new copy engine
    pub fn new(config: CopyConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Set progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    /// Execute the copy operation
    pub fn execute(&self) -> Result<CopyReport> {
        self.config.validate()?;
        let config = &self.config;
        let start_time = Instant::now();

        if let Some(progress) = &self.progress {
            if let Ok(meta) = std::fs::metadata(&config.source) {
                progress.set_total_bytes(meta.len());
            }
            progress.set_status(&format!("Copying ({} mode)", config.mode.name()));
        }

        tracing::info!(
            "{} copy {} -> {}",
            config.mode.name(),
            config.source.display(),
            config.destination.display()
        );

        let outcome = self.run_mode();
        let mut report = match outcome {
            Ok(report) => report,
            Err(e) => {
                if let Some(progress) = &self.progress {
                    progress.finish_error(&e.to_string());
                }
                return Err(e);
            }
        };

        if let Some(algorithm) = config.verify {
            if let Some(progress) = &self.progress {
                progress.set_status(&format!("Verifying with {}", algorithm.name()));
            }
            match verify_copy(&config.source, &config.destination, algorithm) {
                Ok(verification) => report.verification = Some(verification),
                Err(e) => {
                    if let Some(progress) = &self.progress {
                        progress.finish_error(&e.to_string());
                    }
                    return Err(e);
                }
            }
        }

        report.duration = start_time.elapsed();
        if let Some(progress) = &self.progress {
            progress.finish_success(&format!(
                "Copied {}",
                humansize::format_size(report.bytes_copied, humansize::BINARY)
            ));
        }
        Ok(report)
    }

    fn run_mode(&self) -> Result<CopyReport> {
        let config = &self.config;
        let sink = self
            .progress
            .as_ref()
            .map(|p| Arc::clone(p) as Arc<dyn ProgressSink>);

        let report = match config.mode {
            CopyMode::Pipeline => {
                let mut coordinator = Coordinator::new(config.pipeline);
                if let Some(sink) = sink {
                    coordinator = coordinator.with_shared_progress(sink);
                }
                let run = coordinator.run(&config.source, &config.destination)?;
                CopyReport {
                    mode: config.mode,
                    bytes_copied: run.bytes_copied,
                    chunks: run.chunks,
                    duration: run.elapsed,
                    throughput: throughput(run.bytes_copied, run.elapsed),
                    state: Some(run.state),
                    queue: Some(run.queue),
                    timings: run.timings,
                    verification: None,
                }
            }
            CopyMode::Direct | CopyMode::Ranged => {
                let stats = if config.mode == CopyMode::Direct {
                    copy_direct(
                        &config.source,
                        &config.destination,
                        config.pipeline.chunk_size,
                        config.pipeline.timings,
                        sink.as_deref(),
                    )?
                } else {
                    RangedCopier::new(config.threads, config.pipeline.chunk_size)
                        .with_timings(config.pipeline.timings)
                        .copy(&config.source, &config.destination, sink.as_deref())?
                };
                CopyReport {
                    mode: config.mode,
                    bytes_copied: stats.bytes,
                    chunks: stats.chunks,
                    duration: stats.elapsed,
                    throughput: throughput(stats.bytes, stats.elapsed),
                    state: None,
                    queue: None,
                    timings: stats.timings,
                    verification: None,
                }
            }
        };
        Ok(report)
    }
}

fn throughput(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        0.0
    }
}
