//! Per-worker timing counters
//!
//! Each worker owns its own `WorkerTimings` and hands it back when it is
//! joined, so recording needs no synchronisation. Timing is opt-in because
//! taking a timestamp around every lock and syscall is not free.

use crate::error::WorkerRole;
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};

/// Serialize a duration as fractional milliseconds
pub fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

/// Where a worker spent a measured interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting to acquire a lock
    Lock,
    /// Blocked on a condition (queue full, head-of-line chunk missing, sink turn)
    Blocked,
    /// Inside a read or write syscall
    Io,
}

/// Counters for one worker thread
#[derive(Debug, Clone, Serialize)]
pub struct WorkerTimings {
    /// Pool the worker belongs to
    pub role: WorkerRole,
    /// Index within its pool
    pub index: usize,
    /// Chunks handled
    pub chunks: u64,
    /// Bytes handled
    pub bytes: u64,
    /// Time spent acquiring locks
    #[serde(serialize_with = "serialize_millis", rename = "lock_wait_ms")]
    pub lock_wait: Duration,
    /// Time spent blocked on a condition variable
    #[serde(serialize_with = "serialize_millis", rename = "blocked_ms")]
    pub blocked: Duration,
    /// Time spent reading or writing
    #[serde(serialize_with = "serialize_millis", rename = "io_ms")]
    pub io: Duration,
    #[serde(skip)]
    enabled: bool,
}

impl WorkerTimings {
    /// Create counters for a worker; when `enabled` is false nothing is timed
    pub fn new(role: WorkerRole, index: usize, enabled: bool) -> Self {
        Self {
            role,
            index,
            chunks: 0,
            bytes: 0,
            lock_wait: Duration::ZERO,
            blocked: Duration::ZERO,
            io: Duration::ZERO,
            enabled,
        }
    }

    /// Run `f`, charging its wall time to `stage` if timing is enabled
    #[inline]
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        if !self.enabled {
            return f();
        }
        let start = Instant::now();
        let out = f();
        self.add(stage, start.elapsed());
        out
    }

    /// Charge an already measured interval to `stage`
    pub fn add(&mut self, stage: Stage, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        match stage {
            Stage::Lock => self.lock_wait += elapsed,
            Stage::Blocked => self.blocked += elapsed,
            Stage::Io => self.io += elapsed,
        }
    }

    /// Start an interval that the caller closes with [`finish`](Self::finish)
    pub fn start(&self) -> Option<Instant> {
        self.enabled.then(Instant::now)
    }

    /// Finish an interval started with [`start`](Self::start)
    pub fn finish(&mut self, stage: Stage, started: Option<Instant>) {
        if let Some(started) = started {
            self.add(stage, started.elapsed());
        }
    }

    /// Record one handled chunk
    pub fn record_chunk(&mut self, bytes: usize) {
        self.chunks += 1;
        self.bytes += bytes as u64;
    }

    /// Whether timing is being recorded
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sum of all measured intervals
    pub fn total(&self) -> Duration {
        self.lock_wait + self.blocked + self.io
    }
}

/// Totals for one pool
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoleTotals {
    /// Workers in the pool
    pub workers: usize,
    /// Chunks handled by the pool
    pub chunks: u64,
    /// Bytes handled by the pool
    pub bytes: u64,
    /// Summed lock wait
    #[serde(serialize_with = "serialize_millis", rename = "lock_wait_ms")]
    pub lock_wait: Duration,
    /// Summed blocked time
    #[serde(serialize_with = "serialize_millis", rename = "blocked_ms")]
    pub blocked: Duration,
    /// Summed I/O time
    #[serde(serialize_with = "serialize_millis", rename = "io_ms")]
    pub io: Duration,
}

/// Aggregated timing for a whole copy
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingReport {
    /// Every worker's counters
    pub workers: Vec<WorkerTimings>,
}

impl TimingReport {
    /// Build a report from joined workers' counters
    pub fn new(mut workers: Vec<WorkerTimings>) -> Self {
        workers.sort_by_key(|w| (w.role as u8, w.index));
        Self { workers }
    }

    /// Totals for the workers of `role`
    pub fn totals(&self, role: WorkerRole) -> RoleTotals {
        self.workers
            .iter()
            .filter(|w| w.role == role)
            .fold(RoleTotals::default(), |mut acc, w| {
                acc.workers += 1;
                acc.chunks += w.chunks;
                acc.bytes += w.bytes;
                acc.lock_wait += w.lock_wait;
                acc.blocked += w.blocked;
                acc.io += w.io;
                acc
            })
    }

    /// Worker with the most measured time
    pub fn slowest(&self) -> Option<&WorkerTimings> {
        self.workers.iter().max_by_key(|w| w.total())
    }

    /// Print per-pool totals and the slowest worker
    pub fn print(&self) {
        for role in [WorkerRole::Reader, WorkerRole::Writer, WorkerRole::Range] {
            let totals = self.totals(role);
            if totals.workers == 0 {
                continue;
            }
            println!(
                "{:<7} x{:<3} chunks {:>8}  lock {:>10.2?}  blocked {:>10.2?}  io {:>10.2?}",
                role.to_string(),
                totals.workers,
                totals.chunks,
                totals.lock_wait,
                totals.blocked,
                totals.io
            );
        }
        if let Some(slowest) = self.slowest() {
            println!(
                "Slowest: {} {} ({:.2?} measured)",
                slowest.role,
                slowest.index,
                slowest.total()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_records_nothing() {
        let mut t = WorkerTimings::new(WorkerRole::Reader, 0, false);
        let v = t.time(Stage::Io, || {
            std::thread::sleep(Duration::from_millis(2));
            7
        });
        assert_eq!(v, 7);
        assert_eq!(t.total(), Duration::ZERO);
        assert!(t.start().is_none());
    }

    #[test]
    fn test_enabled_accumulates_per_stage() {
        let mut t = WorkerTimings::new(WorkerRole::Writer, 1, true);
        t.time(Stage::Io, || std::thread::sleep(Duration::from_millis(2)));
        t.add(Stage::Lock, Duration::from_millis(5));
        assert!(t.io >= Duration::from_millis(2));
        assert_eq!(t.lock_wait, Duration::from_millis(5));
        assert_eq!(t.blocked, Duration::ZERO);
    }

    #[test]
    fn test_report_totals_and_slowest() {
        let mut a = WorkerTimings::new(WorkerRole::Reader, 0, true);
        a.add(Stage::Io, Duration::from_millis(10));
        a.record_chunk(100);
        let mut b = WorkerTimings::new(WorkerRole::Reader, 1, true);
        b.add(Stage::Io, Duration::from_millis(30));
        b.record_chunk(50);
        let mut c = WorkerTimings::new(WorkerRole::Writer, 0, true);
        c.add(Stage::Blocked, Duration::from_millis(20));

        let report = TimingReport::new(vec![c, b, a]);
        let readers = report.totals(WorkerRole::Reader);
        assert_eq!(readers.workers, 2);
        assert_eq!(readers.chunks, 2);
        assert_eq!(readers.bytes, 150);
        assert_eq!(readers.io, Duration::from_millis(40));

        let slowest = report.slowest().unwrap();
        assert_eq!((slowest.role, slowest.index), (WorkerRole::Reader, 1));
        assert_eq!(report.workers[0].role, WorkerRole::Reader);
        assert_eq!(report.workers[0].index, 0);
    }

    #[test]
    fn test_serializes_millis() {
        let mut t = WorkerTimings::new(WorkerRole::Range, 2, true);
        t.add(Stage::Io, Duration::from_millis(3));
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["io_ms"], 3.0);
        assert_eq!(json["role"], "range");
        assert!(json.get("enabled").is_none());
    }
}
