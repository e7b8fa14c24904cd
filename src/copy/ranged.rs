//! Range-partitioned parallel copy
//!
//! The source is split into one contiguous byte range per worker. Every
//! worker opens its own handles and seeks to its range, so workers share
//! nothing and need no locking.

use crate::config::MAX_CHUNK_SIZE;
use crate::copy::CopyStats;
use crate::error::{CopyError, IoResultExt, Result, WorkerRole};
use crate::progress::ProgressSink;
use crate::stats::{Stage, TimingReport, WorkerTimings};
use rayon::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;
use std::time::Instant;

/// Split `len` bytes into `parts` contiguous ranges
///
/// Every range but the last is `len / parts` bytes; the last one also
/// takes the remainder.
pub fn split_ranges(len: u64, parts: usize) -> Vec<Range<u64>> {
    let parts = parts.max(1) as u64;
    let base = len / parts;
    (0..parts)
        .map(|i| {
            let start = i * base;
            let end = if i + 1 == parts { len } else { start + base };
            start..end
        })
        .collect()
}

/// Copies a file with one worker per byte range
pub struct RangedCopier {
    threads: usize,
    chunk_size: usize,
    timed: bool,
}

impl RangedCopier {
    /// Create a copier with `threads` workers moving `chunk_size` bytes per step
    ///
    /// `chunk_size` is clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn new(threads: usize, chunk_size: usize) -> Self {
        Self {
            threads: threads.max(1),
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
            timed: false,
        }
    }

    /// Record per-worker timing counters
    pub fn with_timings(mut self, timed: bool) -> Self {
        self.timed = timed;
        self
    }

    /// Copy `source` to `destination`
    ///
    /// The destination is truncated and pre-sized to the source length.
    /// Every worker runs to completion before the first error, if any, is
    /// returned.
    pub fn copy(
        &self,
        source: &Path,
        destination: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<CopyStats> {
        let started = Instant::now();

        let len = File::open(source)
            .and_then(|f| f.metadata())
            .map_err(|e| CopyError::SourceOpen {
                path: source.to_path_buf(),
                source: e,
            })?
            .len();

        let output = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(destination)
            .map_err(|e| CopyError::SinkOpen {
                path: destination.to_path_buf(),
                source: e,
            })?;
        output.set_len(len).with_path(destination)?;
        drop(output);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("range-{}", i))
            .build()
            .map_err(|e| CopyError::WorkerSpawn {
                role: WorkerRole::Range,
                index: 0,
                source: io::Error::new(ErrorKind::Other, e),
            })?;

        let ranges = split_ranges(len, self.threads);
        tracing::debug!("copying {} bytes as {} ranges", len, ranges.len());

        let results: Vec<Result<WorkerTimings>> = pool.install(|| {
            ranges
                .into_par_iter()
                .enumerate()
                .map(|(index, range)| self.copy_range(index, range, source, destination, progress))
                .collect()
        });

        let mut workers = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(timings) => workers.push(timings),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => tracing::debug!("additional range failure: {}", e),
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let bytes = workers.iter().map(|w| w.bytes).sum();
        let chunks = workers.iter().map(|w| w.chunks).sum();
        Ok(CopyStats {
            bytes,
            chunks,
            elapsed: started.elapsed(),
            timings: self.timed.then(|| TimingReport::new(workers)),
        })
    }

    fn copy_range(
        &self,
        index: usize,
        range: Range<u64>,
        source: &Path,
        destination: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<WorkerTimings> {
        let mut timings = WorkerTimings::new(WorkerRole::Range, index, self.timed);
        if range.is_empty() {
            return Ok(timings);
        }

        let mut input = File::open(source).map_err(|e| CopyError::SourceOpen {
            path: source.to_path_buf(),
            source: e,
        })?;
        let mut output = OpenOptions::new()
            .write(true)
            .open(destination)
            .map_err(|e| CopyError::SinkOpen {
                path: destination.to_path_buf(),
                source: e,
            })?;

        let chunk_size = self.chunk_size as u64;
        let first = range.start / chunk_size;
        input
            .seek(SeekFrom::Start(range.start))
            .map_err(|source| CopyError::SourceRead { sequence: first, source })?;
        output
            .seek(SeekFrom::Start(range.start))
            .map_err(|source| CopyError::SinkWrite { sequence: first, source })?;

        let mut buffer = vec![0u8; chunk_size.min(range.end - range.start) as usize];
        let mut offset = range.start;
        while offset < range.end {
            let want = chunk_size.min(range.end - offset) as usize;
            let sequence = offset / chunk_size;

            timings
                .time(Stage::Io, || input.read_exact(&mut buffer[..want]))
                .map_err(|source| CopyError::SourceRead { sequence, source })?;
            timings
                .time(Stage::Io, || output.write_all(&buffer[..want]))
                .map_err(|source| CopyError::SinkWrite { sequence, source })?;

            timings.record_chunk(want);
            if let Some(progress) = progress {
                progress.chunk_written(sequence, want as u64);
            }
            offset += want as u64;
        }

        output
            .flush()
            .map_err(|source| CopyError::SinkWrite {
                sequence: offset / chunk_size,
                source,
            })?;
        tracing::trace!("range {} done ({} bytes)", index, range.end - range.start);
        Ok(timings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_split_ranges() {
        assert_eq!(split_ranges(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(split_ranges(0, 2), vec![0..0, 0..0]);
        assert_eq!(split_ranges(2, 4), vec![0..0, 0..0, 0..0, 0..2]);
        assert_eq!(split_ranges(7, 0), vec![0..7]);

        let ranges = split_ranges(1_000_003, 8);
        assert_eq!(ranges.last().unwrap().end, 1_000_003);
        assert!(ranges.windows(2).all(|w| w[0].end == w[1].start));
    }

    #[test]
    fn test_ranged_copy() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        let data: Vec<u8> = (0..1_000_003u32).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::write(&src, &data).unwrap();
        std::fs::write(&dst, vec![1u8; 2_000_000]).unwrap();

        let written = AtomicU64::new(0);
        let progress = |_: u64, n: u64| {
            written.fetch_add(n, Ordering::Relaxed);
        };
        let stats = RangedCopier::new(4, 64 * 1024)
            .with_timings(true)
            .copy(&src, &dst, Some(&progress))
            .unwrap();

        assert_eq!(stats.bytes, data.len() as u64);
        assert_eq!(written.load(Ordering::Relaxed), data.len() as u64);
        assert_eq!(std::fs::read(&dst).unwrap(), data);
        assert_eq!(stats.timings.unwrap().totals(WorkerRole::Range).workers, 4);
    }

    #[test]
    fn test_more_threads_than_bytes() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        std::fs::write(&src, b"abc").unwrap();

        let stats = RangedCopier::new(8, 2).copy(&src, &dst, None).unwrap();
        assert_eq!(stats.bytes, 3);
        assert_eq!(std::fs::read(&dst).unwrap(), b"abc");
    }

    #[test]
    fn test_huge_chunk_size_is_clamped() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        std::fs::write(&src, b"bounded").unwrap();

        let stats = RangedCopier::new(2, usize::MAX).copy(&src, &dst, None).unwrap();
        assert_eq!(stats.bytes, 7);
        assert_eq!(std::fs::read(&dst).unwrap(), b"bounded");
    }

    #[test]
    fn test_ranged_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = RangedCopier::new(2, 16)
            .copy(&dir.path().join("missing"), &dir.path().join("out"), None)
            .unwrap_err();
        assert_eq!(err.kind(), "SourceOpenError");
    }
}
