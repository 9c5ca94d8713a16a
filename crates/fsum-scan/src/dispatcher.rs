//! Single-producer dispatch of admitted files into the worker pool.

use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::debug;

use fsum_core::{FileRecord, ItemFailure, PipelineConfig, PipelineError};

use crate::inode::InodeTracker;
use crate::pool::{Feed, PoolOutcome, WorkerPool};
use crate::progress::PipelineProgress;
use crate::resolver::{EntryResolver, Resolution};
use crate::walker::JwalkWalker;

/// Feeds admitted regular files to the pool.
///
/// Every rejection is reported through the feed; the dispatcher never stops
/// early on a per-entry problem.
pub struct Dispatcher<'a> {
    resolver: EntryResolver<'a>,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher backed by a traversal-scoped tracker.
    pub fn new(tracker: &'a InodeTracker, follow_symlinks: bool) -> Self {
        Self {
            resolver: EntryResolver::new(tracker, follow_symlinks),
        }
    }

    /// Resolve each name in order and submit the admitted ones.
    pub fn dispatch_paths<I, P>(&self, paths: I, feed: &Feed<'_, FileRecord>)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            let resolution = self.resolver.resolve(path.as_ref());
            if !self.emit(resolution, feed) {
                break;
            }
        }
    }

    /// Consume a walker stream, applying only the symlink and seen checks.
    pub fn dispatch_walk<I>(&self, records: I, feed: &Feed<'_, FileRecord>)
    where
        I: IntoIterator<Item = Result<FileRecord, ItemFailure>>,
    {
        for record in records {
            let resolution = match record {
                Ok(record) => self.resolver.classify(record),
                Err(failure) => Resolution::Error(failure),
            };
            if !self.emit(resolution, feed) {
                break;
            }
        }
    }

    /// Returns `false` once no worker is left to receive.
    fn emit(&self, resolution: Resolution, feed: &Feed<'_, FileRecord>) -> bool {
        match resolution {
            Resolution::Admit(record) => feed.submit(record),
            other => {
                if let Some(failure) = other.into_failure() {
                    feed.report(failure);
                }
                true
            }
        }
    }
}

/// Entry point for hashing-style runs over a list of input names.
pub struct Traversal {
    config: PipelineConfig,
    progress_tx: broadcast::Sender<PipelineProgress>,
}

impl Traversal {
    /// Create a traversal with the given config.
    pub fn new(config: PipelineConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config,
            progress_tx,
        }
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineProgress> {
        self.progress_tx.subscribe()
    }

    /// The run configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Apply `action` to every admitted regular file reachable from `inputs`.
    ///
    /// Problems with the inputs themselves (none given, an unreadable root
    /// while recursing, a bad exclude pattern) are fatal and reported before
    /// any worker starts. Everything else ends up in the outcome's failures.
    pub fn run<A>(&self, inputs: &[PathBuf], action: A) -> Result<PoolOutcome, PipelineError>
    where
        A: Fn(&FileRecord) -> Result<u64, ItemFailure> + Sync,
    {
        if inputs.is_empty() {
            return Err(PipelineError::NoInputs);
        }

        let tracker = InodeTracker::new();
        let dispatcher = Dispatcher::new(&tracker, self.config.follow_symlinks);

        let outcome = if self.config.recurse {
            let walker = JwalkWalker::new(self.config.walk_options(inputs.to_vec()))?;
            walker.check_roots()?;

            let pool = WorkerPool::from_config(&self.config, None)
                .with_progress(self.progress_tx.clone());
            debug!(workers = pool.workers(), roots = inputs.len(), "starting recursive run");
            pool.run(|feed| dispatcher.dispatch_walk(walker.walk(), feed), action)?
        } else {
            let pool = WorkerPool::from_config(&self.config, Some(inputs.len()))
                .with_progress(self.progress_tx.clone());
            debug!(workers = pool.workers(), inputs = inputs.len(), "starting run");
            pool.run(|feed| dispatcher.dispatch_paths(inputs, feed), action)?
        };

        debug!(
            unique = tracker.len(),
            succeeded = outcome.succeeded,
            failed = outcome.failures.len(),
            "run complete"
        );
        Ok(outcome)
    }
}
