//! Single-threaded copy

use crate::config::validate_chunk_size;
use crate::copy::CopyStats;
use crate::error::{CopyError, Result, WorkerRole};
use crate::progress::ProgressSink;
use crate::stats::{Stage, TimingReport, WorkerTimings};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Instant;

/// Copy `source` to `destination` with one buffer and one thread
///
/// The destination is created or truncated first. Each step reads up to
/// `chunk_size` bytes and writes whatever was read.
pub fn copy_direct(
    source: &Path,
    destination: &Path,
    chunk_size: usize,
    timed: bool,
    progress: Option<&dyn ProgressSink>,
) -> Result<CopyStats> {
    validate_chunk_size(chunk_size)?;
    let started = Instant::now();

    let mut input = File::open(source).map_err(|e| CopyError::SourceOpen {
        path: source.to_path_buf(),
        source: e,
    })?;
    let mut output = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .map_err(|e| CopyError::SinkOpen {
            path: destination.to_path_buf(),
            source: e,
        })?;

    let mut read_timings = WorkerTimings::new(WorkerRole::Reader, 0, timed);
    let mut write_timings = WorkerTimings::new(WorkerRole::Writer, 0, timed);
    let mut buffer = vec![0u8; chunk_size];
    let mut sequence = 0u64;
    let mut bytes = 0u64;

    loop {
        let n = match read_timings.time(Stage::Io, || input.read(&mut buffer)) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => return Err(CopyError::SourceRead { sequence, source }),
        };
        read_timings.record_chunk(n);

        write_timings
            .time(Stage::Io, || output.write_all(&buffer[..n]))
            .map_err(|source| CopyError::SinkWrite { sequence, source })?;
        write_timings.record_chunk(n);

        if let Some(progress) = progress {
            progress.chunk_written(sequence, n as u64);
        }
        sequence += 1;
        bytes += n as u64;
    }

    output
        .flush()
        .map_err(|source| CopyError::SinkWrite { sequence, source })?;
    tracing::debug!("direct copy wrote {} bytes in {} steps", bytes, sequence);

    Ok(CopyStats {
        bytes,
        chunks: sequence,
        elapsed: started.elapsed(),
        timings: timed.then(|| TimingReport::new(vec![read_timings, write_timings])),
    })
}
