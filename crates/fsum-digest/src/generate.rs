//! Manifest generation.
//!
//! Workers hash admitted files and hand `(digest, size, path)` triples to a
//! single writer thread over a bounded channel, so a slow sink stalls the
//! workers instead of buffering results. Shutdown runs in this order:
//! traversal finished (all workers joined), result channel closed, writer
//! joined.

use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;

use crossbeam_channel::{Receiver, bounded};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use fsum_core::{FailureKind, FailureSet, ItemFailure, PipelineConfig, PipelineError};
use fsum_scan::{PipelineProgress, Traversal};

use crate::algorithm::Algorithm;
use crate::hasher::FileHasher;
use crate::manifest::{ManifestEntry, ManifestWriter};

/// Capacity of the result channel.
const RESULT_CHANNEL_SIZE: usize = 16;

/// Result of a hashing run.
#[derive(Debug, Serialize)]
pub struct HashReport {
    /// Algorithm used.
    pub algorithm: Algorithm,
    /// Files hashed and written to the manifest.
    pub files: u64,
    /// Bytes hashed.
    pub bytes: u64,
    /// Every per-item failure, in arrival order.
    pub failures: Vec<ItemFailure>,
}

impl HashReport {
    /// Check if every input was hashed.
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

/// Hashes a set of inputs into a manifest.
pub struct Generator {
    traversal: Traversal,
    algorithm: Algorithm,
}

impl Generator {
    /// Create a generator.
    pub fn new(config: PipelineConfig, algorithm: Algorithm) -> Self {
        Self {
            traversal: Traversal::new(config),
            algorithm,
        }
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineProgress> {
        self.traversal.subscribe()
    }

    /// Hash every admitted file under `inputs` and write the manifest to `out`.
    ///
    /// Files that fail are left out of the manifest and listed in the report.
    /// A failure to write the manifest itself is fatal, but is only reported
    /// once every worker has finished.
    pub fn run<W>(&self, inputs: &[PathBuf], out: W) -> Result<(HashReport, W), PipelineError>
    where
        W: Write + Send,
    {
        let hasher = FileHasher::new(self.algorithm)?;
        let writer = ManifestWriter::new(out, self.algorithm)
            .map_err(|source| PipelineError::Output { source })?;

        let (result_tx, result_rx) = bounded::<ManifestEntry>(RESULT_CHANNEL_SIZE);

        let (outcome, written) = thread::scope(|s| {
            let sink = s.spawn(move || write_results(writer, result_rx));

            let outcome = self.traversal.run(inputs, |record| {
                let (digest, size) = hasher
                    .hash_file(&record.path)
                    .map_err(|e| ItemFailure::read(&record.path, e))?;
                result_tx
                    .send(ManifestEntry::new(digest, size, &record.path))
                    .map_err(|_| {
                        ItemFailure::new(
                            &record.path,
                            format!("can't record {}: writer stopped", record.path.display()),
                            FailureKind::Read,
                        )
                    })?;
                Ok(size)
            });

            // Don't reorder: the writer only exits once the channel is closed.
            drop(result_tx);
            (outcome, sink.join())
        });

        let outcome = outcome?;
        let (writer, write_error) =
            written.map_err(|_| PipelineError::WorkerPanicked { role: "writer" })?;

        if let Some(source) = write_error {
            return Err(PipelineError::Output { source });
        }
        let files = writer.entries();
        let out = writer
            .finish()
            .map_err(|source| PipelineError::Output { source })?;

        info!(
            algorithm = %self.algorithm,
            files,
            bytes = outcome.bytes,
            failed = outcome.failures.len(),
            "hashing complete"
        );

        let report = HashReport {
            algorithm: self.algorithm,
            files,
            bytes: outcome.bytes,
            failures: outcome.failures,
        };
        Ok((report, out))
    }
}

/// Drain results into the manifest. After the first write error the rest
/// are discarded so workers never block on a dead sink.
fn write_results<W: Write>(
    mut writer: ManifestWriter<W>,
    results: Receiver<ManifestEntry>,
) -> (ManifestWriter<W>, Option<io::Error>) {
    let mut error = None;
    for entry in results.iter() {
        if error.is_some() {
            continue;
        }
        if let Err(e) = writer.write_entry(&entry.digest, entry.size, &entry.path) {
            warn!(path = %entry.path.display(), error = %e, "manifest write failed");
            error = Some(e);
        }
    }
    (writer, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestReader;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// Accepts `room` bytes, then fails every write.
    struct FullDisk {
        room: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.room == 0 {
                return Err(io::Error::other("disk full"));
            }
            let n = buf.len().min(self.room);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_manifest_lists_every_file() {
        let temp = TempDir::new().unwrap();
        let inputs: Vec<PathBuf> = (0..5)
            .map(|i| {
                let path = temp.path().join(format!("f{i}"));
                fs::write(&path, "x".repeat(i + 1)).unwrap();
                path
            })
            .collect();

        let generator = Generator::new(PipelineConfig::default(), Algorithm::Sha256);
        let (report, out) = generator.run(&inputs, Vec::new()).unwrap();

        assert_eq!(report.files, 5);
        assert_eq!(report.bytes, 15);
        assert_eq!(report.exit_code(), 0);

        let reader = ManifestReader::open("out", Cursor::new(out)).unwrap();
        let mut paths: Vec<PathBuf> = reader.map(|e| e.unwrap().path).collect();
        paths.sort();
        assert_eq!(paths, inputs);
    }

    #[test]
    fn test_failed_inputs_are_reported_not_written() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good");
        fs::write(&good, "ok").unwrap();

        let generator = Generator::new(PipelineConfig::default(), Algorithm::Blake3);
        let (report, out) = generator
            .run(&[good.clone(), temp.path().join("missing")], Vec::new())
            .unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_failed_final_flush_is_fatal() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        fs::write(&file, "data").unwrap();

        // Header and entry stay buffered until finish()
        let generator = Generator::new(PipelineConfig::default(), Algorithm::Sha256);
        let result = generator.run(&[file], FullDisk { room: 0 });
        assert!(matches!(result, Err(PipelineError::Output { .. })));
    }

    #[test]
    fn test_write_failure_mid_run_drains_workers() {
        let temp = TempDir::new().unwrap();
        let inputs: Vec<PathBuf> = (0..300)
            .map(|i| {
                let path = temp.path().join(format!("file-with-a-longish-name-{i:04}"));
                fs::write(&path, i.to_string()).unwrap();
                path
            })
            .collect();

        // Entries overflow the write buffer long before the last file is hashed
        let generator = Generator::new(PipelineConfig::default(), Algorithm::Sha256);
        let result = generator.run(&inputs, FullDisk { room: 100 });
        assert!(matches!(result, Err(PipelineError::Output { .. })));
    }

    #[test]
    fn test_no_inputs_is_fatal() {
        let generator = Generator::new(PipelineConfig::default(), Algorithm::Sha256);
        let result = generator.run(&[], Vec::new());
        assert!(matches!(result, Err(PipelineError::NoInputs)));
    }
}
