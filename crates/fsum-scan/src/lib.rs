//! Traversal and worker pool engine for fsum.
//!
//! This crate turns a list of input names into a deduplicated stream of
//! regular files and fans them out to a pool of worker threads.
//!
//! # Overview
//!
//! - **Inode tracking**: every filesystem object is admitted once, no matter
//!   how many hardlinks or symlinks reach it
//! - **Symlink resolution**: chains are resolved in full; loops end in a
//!   diagnostic rather than recursion
//! - **Recursive mode**: jwalk discovers entries, the dispatcher only
//!   deduplicates them
//! - **Bounded channels**: backpressure from slow workers stalls the producer
//! - **Ordered shutdown**: failures are read only after every worker has
//!   exited and the aggregator has drained the error channel
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use fsum_scan::{PipelineConfig, Traversal};
//!
//! let traversal = Traversal::new(PipelineConfig::default());
//! let outcome = traversal
//!     .run(&[PathBuf::from("/etc/hosts")], |record| Ok(record.size))
//!     .unwrap();
//!
//! println!("{} files, {} failures", outcome.succeeded, outcome.failures.len());
//! ```

mod dispatcher;
mod inode;
mod pool;
mod progress;
mod resolver;
mod walker;

pub use dispatcher::{Dispatcher, Traversal};
pub use inode::InodeTracker;
pub use pool::{ErrorAggregator, Feed, PoolOutcome, WorkItem, WorkerPool};
pub use progress::{PipelineProgress, PipelineState};
pub use resolver::{EntryResolver, Resolution};
pub use walker::JwalkWalker;

// Re-export core types for convenience
pub use fsum_core::{
    EntryFilter, FailureKind, FailureSet, FileKind, FileRecord, InodeKey, ItemFailure,
    PipelineConfig, PipelineError, WalkOptions,
};
