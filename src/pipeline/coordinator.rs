//! Pipeline coordinator
//!
//! Opens the streams, starts both worker pools, and walks the pipeline
//! through `Idle -> Running -> Draining -> Done`.

use crate::config::PipelineConfig;
use crate::error::{CopyError, Result, WorkerRole};
use crate::pipeline::worker::{reader_loop, writer_loop, Shared};
use crate::pipeline::{lock, BufferPool, ChunkSink, ChunkSource, QueueStats, StagingQueue};
use crate::progress::ProgressSink;
use crate::stats::{serialize_millis, TimingReport, WorkerTimings};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where a pipeline run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Streams not yet opened
    Idle,
    /// Both pools started
    Running,
    /// Every reader has finished; writers are flushing resident chunks
    Draining,
    /// Every worker joined and the streams closed
    Done,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Wall time from opening the streams to joining the last writer
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
    /// Bytes written to the sink
    pub bytes_copied: u64,
    /// Chunks the source was split into
    pub chunks: u64,
    /// Final coordinator state
    pub state: PipelineState,
    /// Value of the producing flag after teardown
    pub producing_active: bool,
    /// Value of the consuming flag after teardown
    pub consuming_active: bool,
    /// Staging queue counters
    pub queue: QueueStats,
    /// Per-worker timings, when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings: Option<TimingReport>,
    /// Chunk buffers allocated over the run
    pub buffers_allocated: u64,
}

/// Starts worker threads inside a scope
pub(crate) trait Spawner {
    fn spawn<'scope, 'env, F>(
        &self,
        scope: &'scope thread::Scope<'scope, 'env>,
        role: WorkerRole,
        index: usize,
        work: F,
    ) -> io::Result<ScopedJoinHandle<'scope, WorkerTimings>>
    where
        F: FnOnce() -> WorkerTimings + Send + 'scope;
}

/// OS threads named after their role and index, e.g. `reader-0`
pub(crate) struct NamedThreads;

impl Spawner for NamedThreads {
    fn spawn<'scope, 'env, F>(
        &self,
        scope: &'scope thread::Scope<'scope, 'env>,
        role: WorkerRole,
        index: usize,
        work: F,
    ) -> io::Result<ScopedJoinHandle<'scope, WorkerTimings>>
    where
        F: FnOnce() -> WorkerTimings + Send + 'scope,
    {
        thread::Builder::new()
            .name(format!("{}-{}", role, index))
            .spawn_scoped(scope, work)
    }
}

/// Runs one reader pool and one writer pool around a staging queue
pub struct Coordinator {
    config: PipelineConfig,
    progress: Option<Arc<dyn ProgressSink>>,
    state: Mutex<PipelineState>,
}

impl Coordinator {
    /// Create a coordinator; the configuration is fixed from here on
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            progress: None,
            state: Mutex::new(PipelineState::Idle),
        }
    }

    /// Invoke `progress` after every completed sink write
    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Share an existing progress sink
    pub fn with_shared_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    fn set_state(&self, state: PipelineState) {
        debug!("pipeline state -> {:?}", state);
        *lock(&self.state) = state;
    }

    /// Copy the file at `source` to `destination`, creating or truncating it
    pub fn run(&self, source: &Path, destination: &Path) -> Result<PipelineReport> {
        self.config.validate()?;

        let input = File::open(source).map_err(|e| CopyError::SourceOpen {
            path: source.to_path_buf(),
            source: e,
        })?;
        let total_len = input.metadata().ok().map(|m| m.len());

        let output = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(destination)
            .map_err(|e| CopyError::SinkOpen {
                path: destination.to_path_buf(),
                source: e,
            })?;

        info!(
            "pipeline copy {} -> {} ({} readers, {} writers)",
            source.display(),
            destination.display(),
            self.config.readers,
            self.config.writers
        );

        // Reads and writes of at least the buffer size bypass the buffer.
        let reader = BufReader::with_capacity(self.config.chunk_size.min(1 << 20), input);
        let writer = BufWriter::with_capacity(self.config.chunk_size.min(1 << 20), output);
        let (_, report) = self.run_streams(reader, writer, total_len)?;
        Ok(report)
    }

    /// Copy `reader` into `writer` and hand the writer back when done
    ///
    /// `total_len` is the source length if known; it is only used to warn
    /// when the bytes written do not match it.
    pub fn run_streams<R, W>(
        &self,
        reader: R,
        writer: W,
        total_len: Option<u64>,
    ) -> Result<(W, PipelineReport)>
    where
        R: Read + Send,
        W: Write + Send,
    {
        self.run_streams_with(reader, writer, total_len, &NamedThreads)
    }

    fn run_streams_with<R, W, S>(
        &self,
        reader: R,
        writer: W,
        total_len: Option<u64>,
        spawner: &S,
    ) -> Result<(W, PipelineReport)>
    where
        R: Read + Send,
        W: Write + Send,
        S: Spawner,
    {
        let config = self.config;
        config.validate()?;
        let started = Instant::now();

        let pool = Arc::new(BufferPool::new(config.chunk_size, config.buffer_budget()));
        let shared = Shared::new(
            ChunkSource::new(reader, Arc::clone(&pool)),
            StagingQueue::new(config.queue_capacity, config.readers),
            ChunkSink::new(writer, total_len),
            Arc::clone(&pool),
            self.progress.clone(),
        );

        self.set_state(PipelineState::Running);
        let workers = thread::scope(|scope| self.drive(scope, &shared, spawner));
        self.set_state(PipelineState::Done);

        let elapsed = started.elapsed();
        if let Some(err) = shared.take_failure() {
            let stranded = shared.queue.drain();
            debug!("discarding {} staged chunks after failure", stranded.len());
            return Err(err);
        }

        let producing_active = shared.queue.producing_active();
        let consuming_active = shared.queue.consuming_active();
        let queue = shared.queue.stats();
        let chunks = shared.source.chunks_issued();
        let bytes_read = shared.source.bytes_read();
        if let Some(expected) = shared.sink.expected_len() {
            let written = shared.sink.bytes_written();
            if !shared.sink.is_complete() {
                warn!(
                    "source was {} bytes when opened but only {} bytes were copied",
                    expected, written
                );
            } else if written > expected {
                warn!("source grew from {} to {} bytes during the copy", expected, written);
            }
        }
        let (writer, bytes_copied) = shared.sink.finish()?;

        if bytes_read != bytes_copied {
            warn!("read {} bytes but wrote {}", bytes_read, bytes_copied);
        }

        info!("pipeline copied {} bytes in {} chunks", bytes_copied, chunks);
        let report = PipelineReport {
            elapsed,
            bytes_copied,
            chunks,
            state: self.state(),
            producing_active,
            consuming_active,
            queue,
            timings: config.timings.then(|| TimingReport::new(workers)),
            buffers_allocated: pool.allocated(),
        };
        Ok((writer, report))
    }

    /// Spawn both pools inside `scope` and join them, readers first
    fn drive<'scope, 'env, R, W, S>(
        &self,
        scope: &'scope thread::Scope<'scope, 'env>,
        shared: &'env Shared<R, W>,
        spawner: &S,
    ) -> Vec<WorkerTimings>
    where
        R: Read + Send,
        W: Write + Send,
        S: Spawner,
    {
        let config = self.config;

        let mut readers = Vec::with_capacity(config.readers);
        for index in 0..config.readers {
            let spawned = spawner.spawn(scope, WorkerRole::Reader, index, move || {
                reader_loop(shared, index, config.timings)
            });
            match spawned {
                Ok(handle) => readers.push((index, handle)),
                Err(source) => {
                    shared.fail(CopyError::WorkerSpawn {
                        role: WorkerRole::Reader,
                        index,
                        source,
                    });
                    // Readers that never started still count as finished.
                    for _ in index..config.readers {
                        shared.queue.producer_done();
                    }
                    break;
                }
            }
        }

        let mut writers = Vec::with_capacity(config.writers);
        if !shared.has_failed() {
            for index in 0..config.writers {
                let spawned = spawner.spawn(scope, WorkerRole::Writer, index, move || {
                    writer_loop(shared, index, config.timings)
                });
                match spawned {
                    Ok(handle) => writers.push((index, handle)),
                    Err(source) => {
                        shared.fail(CopyError::WorkerSpawn {
                            role: WorkerRole::Writer,
                            index,
                            source,
                        });
                        break;
                    }
                }
            }
        }
        debug!("started {} readers and {} writers", readers.len(), writers.len());

        let mut timings = join_all(shared, WorkerRole::Reader, readers);
        self.set_state(PipelineState::Draining);
        timings.extend(join_all(shared, WorkerRole::Writer, writers));
        timings
    }
}

fn join_all<R: Read, W: Write>(
    shared: &Shared<R, W>,
    role: WorkerRole,
    handles: Vec<(usize, ScopedJoinHandle<'_, WorkerTimings>)>,
) -> Vec<WorkerTimings> {
    let mut timings = Vec::with_capacity(handles.len());
    for (index, handle) in handles {
        match handle.join() {
            Ok(t) => timings.push(t),
            Err(_) => shared.fail(CopyError::WorkerJoin { role, index }),
        }
    }
    timings
}
