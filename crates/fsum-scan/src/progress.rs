//! Pipeline progress reporting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

/// Progress information during a run.
#[derive(Debug, Clone)]
pub struct PipelineProgress {
    /// Current lifecycle state.
    pub state: PipelineState,
    /// Work items handed to the workers.
    pub files_dispatched: u64,
    /// Work items the workers finished successfully.
    pub files_processed: u64,
    /// Failures reported so far.
    pub failures: u64,
    /// Bytes processed so far.
    pub bytes_processed: u64,
    /// Most recently processed path.
    pub current_path: PathBuf,
    /// Time elapsed since the run started.
    pub elapsed: Duration,
}

impl PipelineProgress {
    /// Calculate throughput in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_processed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Calculate throughput in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.bytes_processed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Lifecycle of one run. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PipelineState {
    /// Nothing started yet.
    Idle = 0,
    /// The dispatcher is reading input.
    Dispatching = 1,
    /// Input exhausted and work channel closed; workers still finishing.
    Draining = 2,
    /// All workers exited and all failures collected.
    Done = 3,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Dispatching,
            2 => Self::Draining,
            _ => Self::Done,
        }
    }
}

/// Progress updates are broadcast every this many processed items.
const PROGRESS_INTERVAL: u64 = 256;

/// Shared counters for one run, updated from every pipeline thread.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    state: AtomicU8,
    dispatched: AtomicU64,
    processed: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
    tx: Option<broadcast::Sender<PipelineProgress>>,
}

impl ProgressTracker {
    pub fn new(tx: Option<broadcast::Sender<PipelineProgress>>) -> Self {
        Self {
            start_time: Instant::now(),
            state: AtomicU8::new(PipelineState::Idle as u8),
            dispatched: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            tx,
        }
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move forward to `next`. Backward or repeated transitions are ignored.
    pub fn advance(&self, next: PipelineState) {
        let prev = self.state.fetch_max(next as u8, Ordering::AcqRel);
        if prev < next as u8 {
            self.publish(PathBuf::new());
        }
    }

    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self, path: &std::path::Path, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        let count = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if count % PROGRESS_INTERVAL == 0 {
            self.publish(path.to_path_buf());
        }
    }

    pub fn snapshot(&self, current_path: PathBuf) -> PipelineProgress {
        PipelineProgress {
            state: self.state(),
            files_dispatched: self.dispatched.load(Ordering::Relaxed),
            files_processed: self.processed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            bytes_processed: self.bytes.load(Ordering::Relaxed),
            current_path,
            elapsed: self.start_time.elapsed(),
        }
    }

    fn publish(&self, current_path: PathBuf) {
        if let Some(tx) = &self.tx {
            // No subscribers is fine
            let _ = tx.send(self.snapshot(current_path));
        }
    }
}
