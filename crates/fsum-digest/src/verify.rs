//! Manifest verification.

use std::io::BufRead;

use constant_time_eq::constant_time_eq;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use fsum_core::{FailureKind, FailureSet, FileRecord, ItemFailure, PipelineConfig, PipelineError};
use fsum_scan::{PipelineProgress, WorkerPool};

use crate::algorithm::Algorithm;
use crate::hasher::FileHasher;
use crate::manifest::{ManifestEntry, ManifestReader};

/// Result of verifying one manifest.
#[derive(Debug, Serialize)]
pub struct VerifyReport {
    /// Manifest name as given.
    pub manifest: String,
    /// Algorithm named in the manifest header.
    pub algorithm: Algorithm,
    /// Entries whose size and digest matched.
    pub verified: u64,
    /// Bytes hashed for matching entries.
    pub bytes: u64,
    /// Every per-entry failure, in arrival order.
    pub failures: Vec<ItemFailure>,
}

impl VerifyReport {
    /// Check if every entry matched.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// 0 without failures, 1 with any number of them.
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_ok())
    }

    /// Merged failures, if any.
    pub fn failure_set(&self) -> Option<FailureSet> {
        FailureSet::from_failures(self.failures.clone())
    }
}

/// Re-hashes the files named in a manifest and compares them.
pub struct Verifier {
    config: PipelineConfig,
    progress_tx: broadcast::Sender<PipelineProgress>,
}

impl Verifier {
    /// Create a verifier. Only the pool sizing fields of `config` apply.
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

    /// Verify the manifest read from `reader`.
    ///
    /// A bad header is fatal. Every other problem is reported per entry.
    pub fn verify<R>(&self, name: &str, reader: R) -> Result<VerifyReport, PipelineError>
    where
        R: BufRead + Send,
    {
        let manifest = ManifestReader::open(name, reader)?;
        let algorithm = manifest.algorithm();
        let hasher = FileHasher::new(algorithm)?;

        // Entry count is unknown up front, so the pool is not capped by it.
        let pool =
            WorkerPool::from_config(&self.config, None).with_progress(self.progress_tx.clone());
        debug!(manifest = name, %algorithm, workers = pool.workers(), "verifying");

        let outcome = pool.run(
            |feed| {
                for item in manifest {
                    match item {
                        Ok(entry) => {
                            if !feed.submit(entry) {
                                break;
                            }
                        }
                        Err(failure) => feed.report(failure),
                    }
                }
            },
            |entry: &ManifestEntry| check_entry(&hasher, name, entry),
        )?;

        info!(
            manifest = name,
            verified = outcome.succeeded,
            failed = outcome.failures.len(),
            "verification complete"
        );

        Ok(VerifyReport {
            manifest: name.to_string(),
            algorithm,
            verified: outcome.succeeded,
            bytes: outcome.bytes,
            failures: outcome.failures,
        })
    }
}

/// Check one entry: stat, size, then digest. Returns the bytes hashed.
fn check_entry(hasher: &FileHasher, name: &str, entry: &ManifestEntry) -> Result<u64, ItemFailure> {
    let path = &entry.path;
    let fail = |message: String, kind| ItemFailure::new(path, message, kind).at(name, entry.line);

    let record = FileRecord::stat(path).map_err(|e| ItemFailure::stat(path, e).at(name, entry.line))?;
    if !record.is_file() {
        return Err(fail(
            format!("'{}' not a file", path.display()),
            FailureKind::NotAFile,
        ));
    }
    if record.size != entry.size {
        return Err(fail(
            format!(
                "'{}' size mismatch: exp {}, saw {}",
                path.display(),
                entry.size,
                record.size
            ),
            FailureKind::SizeMismatch,
        ));
    }

    let (digest, hashed) = hasher
        .hash_file(path)
        .map_err(|e| ItemFailure::read(path, e).at(name, entry.line))?;

    // The file may have changed between stat and read
    if hashed != entry.size {
        return Err(fail(
            format!(
                "'{}' hash size mismatch: exp {}, saw {hashed}",
                path.display(),
                entry.size
            ),
            FailureKind::SizeMismatch,
        ));
    }
    if !constant_time_eq(digest.as_bytes(), entry.digest.as_bytes()) {
        return Err(fail(
            format!("file modified '{}'", path.display()),
            FailureKind::DigestMismatch,
        ));
    }

    Ok(hashed)
}
