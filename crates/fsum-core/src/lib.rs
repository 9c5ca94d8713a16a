//! Core types and traits for fsum.
//!
//! This crate provides the fundamental data structures shared by the
//! scanning and digest crates: file records, inode identities, digests,
//! the error taxonomy, and configuration.

mod config;
mod error;
mod record;

pub use config::{
    DEFAULT_PARALLELISM, EntryFilter, PipelineConfig, PipelineConfigBuilder, WalkOptions,
    WalkOptionsBuilder,
};
pub use error::{FailureKind, FailureSet, ItemFailure, Location, PipelineError};
pub use record::{Digest, FileKind, FileRecord, InodeKey};
