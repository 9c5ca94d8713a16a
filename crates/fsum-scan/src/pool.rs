//! Fan-out worker pool with fan-in error aggregation.
//!
//! A run owns three kinds of threads inside one scope: a single dispatcher
//! feeding the bounded work channel, `N` workers draining it, and one
//! aggregator collecting failures from the error channel. Shutdown is
//! strictly ordered:
//!
//! 1. join the dispatcher and every worker,
//! 2. drop the last error sender, closing the error channel,
//! 3. join the aggregator.
//!
//! The failure list is only read after step 3.

use std::path::Path;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use fsum_core::{ItemFailure, PipelineConfig, PipelineError};

use crate::progress::{PipelineProgress, PipelineState, ProgressTracker};

/// Capacity of the error channel.
const ERROR_CHANNEL_SIZE: usize = 16;

/// An item the pool can process.
pub trait WorkItem: Send {
    /// Path the item refers to, for progress reporting.
    fn path(&self) -> &Path;
}

impl WorkItem for fsum_core::FileRecord {
    fn path(&self) -> &Path {
        &self.path
    }
}

/// Producer side of a run, handed to the dispatch closure.
pub struct Feed<'a, T> {
    work: Sender<T>,
    errors: Sender<ItemFailure>,
    progress: &'a ProgressTracker,
}

impl<T> Feed<'_, T> {
    /// Queue an item, blocking while the work channel is full.
    ///
    /// Returns `false` if every worker has gone away.
    pub fn submit(&self, item: T) -> bool {
        match self.work.send(item) {
            Ok(()) => {
                self.progress.record_dispatch();
                true
            }
            Err(_) => false,
        }
    }

    /// Report a non-fatal failure.
    pub fn report(&self, failure: ItemFailure) {
        debug!(%failure, "dispatch failure");
        self.progress.record_failure();
        let _ = self.errors.send(failure);
    }
}

/// Result of a completed run.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    /// Items the action completed successfully.
    pub succeeded: u64,
    /// Bytes reported by successful actions.
    pub bytes: u64,
    /// Every failure, in arrival order.
    pub failures: Vec<ItemFailure>,
}

/// Drains the error channel into an ordered list.
pub struct ErrorAggregator;

impl ErrorAggregator {
    /// Collect until every sender has been dropped.
    pub fn drain(errors: Receiver<ItemFailure>) -> Vec<ItemFailure> {
        errors.iter().collect()
    }
}

/// Fixed-size pool of worker threads.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    capacity: usize,
    progress_tx: Option<broadcast::Sender<PipelineProgress>>,
}

impl WorkerPool {
    /// Create a pool with `workers` threads and a work channel of `capacity`.
    pub fn new(workers: usize, capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            capacity: capacity.max(1),
            progress_tx: None,
        }
    }

    /// Size a pool from the config. `inputs` caps the worker count when known.
    pub fn from_config(config: &PipelineConfig, inputs: Option<usize>) -> Self {
        let cpus = num_cpus::get();
        let workers = match inputs {
            Some(n) => config.workers_for(cpus, n),
            None => config.max_workers(cpus),
        };
        Self::new(workers, config.work_capacity(workers))
    }

    /// Broadcast progress snapshots on `tx`.
    pub fn with_progress(mut self, tx: broadcast::Sender<PipelineProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `dispatch` as the single producer and `action` on every item.
    ///
    /// Per-item failures are collected, never fatal. Only a panicking
    /// pipeline thread makes the run itself fail.
    pub fn run<T, D, A>(&self, dispatch: D, action: A) -> Result<PoolOutcome, PipelineError>
    where
        T: WorkItem,
        D: FnOnce(&Feed<'_, T>) + Send,
        A: Fn(&T) -> Result<u64, ItemFailure> + Sync,
    {
        let progress = ProgressTracker::new(self.progress_tx.clone());
        let (work_tx, work_rx) = bounded::<T>(self.capacity);
        let (err_tx, err_rx) = bounded::<ItemFailure>(ERROR_CHANNEL_SIZE);

        let (failures, panicked) = thread::scope(|s| {
            let progress = &progress;
            let action = &action;

            let aggregator = s.spawn(move || ErrorAggregator::drain(err_rx));

            let workers: Vec<_> = (0..self.workers)
                .map(|_| {
                    let rx = work_rx.clone();
                    let errors = err_tx.clone();
                    s.spawn(move || worker_loop(rx, errors, action, progress))
                })
                .collect();
            drop(work_rx);

            let dispatcher = {
                let feed = Feed {
                    work: work_tx,
                    errors: err_tx.clone(),
                    progress,
                };
                s.spawn(move || {
                    progress.advance(PipelineState::Dispatching);
                    dispatch(&feed);
                    drop(feed);
                    progress.advance(PipelineState::Draining);
                })
            };

            let mut panicked = None;
            if dispatcher.join().is_err() {
                panicked = Some("dispatcher");
            }
            for worker in workers {
                if worker.join().is_err() {
                    panicked.get_or_insert("worker");
                }
            }

            // Don't reorder: the error list is only final once the channel
            // is closed and the aggregator has drained it.
            drop(err_tx);
            let failures = aggregator.join();
            (failures, panicked)
        });

        let failures = failures.map_err(|_| PipelineError::WorkerPanicked { role: "aggregator" })?;
        if let Some(role) = panicked {
            warn!(role, "pipeline thread panicked");
            return Err(PipelineError::WorkerPanicked { role });
        }
        progress.advance(PipelineState::Done);

        let snapshot = progress.snapshot(Default::default());
        Ok(PoolOutcome {
            succeeded: snapshot.files_processed,
            bytes: snapshot.bytes_processed,
            failures,
        })
    }
}

fn worker_loop<T, A>(
    work: Receiver<T>,
    errors: Sender<ItemFailure>,
    action: &A,
    progress: &ProgressTracker,
) where
    T: WorkItem,
    A: Fn(&T) -> Result<u64, ItemFailure>,
{
    for item in work.iter() {
        match action(&item) {
            Ok(bytes) => progress.record_processed(item.path(), bytes),
            Err(failure) => {
                progress.record_failure();
                let _ = errors.send(failure);
            }
        }
    }
}
