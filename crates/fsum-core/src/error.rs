//! Error types for hashing and verification runs.
//!
//! Two tiers: [`PipelineError`] aborts a run before (or instead of) producing
//! results, while [`ItemFailure`] describes a single entry that could not be
//! processed. Item failures are collected for the whole run and reported
//! together as a [`FailureSet`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Nothing to process.
    #[error("No input paths given")]
    NoInputs,

    /// Permission denied for a root path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Root path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error on a root path or the manifest.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Hash algorithm name is not in the registry.
    #[error("Unknown hash algorithm '{name}'")]
    UnknownAlgorithm { name: String },

    /// Keyed hash constructor rejected its key.
    #[error("Cannot initialize {algorithm}: {message}")]
    KeyInit { algorithm: String, message: String },

    /// Manifest header is missing or incomplete.
    #[error("{name}: possibly corrupt; {reason}")]
    CorruptManifest { name: String, reason: String },

    /// First line does not carry the manifest magic.
    #[error("{name}: Not an fsum manifest")]
    NotAManifest { name: String },

    /// Writing the manifest failed.
    #[error("Output error: {source}")]
    Output {
        #[source]
        source: std::io::Error,
    },

    /// A pipeline thread panicked.
    #[error("{role} thread panicked")]
    WorkerPanicked { role: &'static str },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl PipelineError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create a corrupt-manifest error.
    pub fn corrupt(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptManifest {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Kind of per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// `stat`/`lstat` failed.
    Stat,
    /// Symlink chain is broken, unreadable or loops.
    BrokenSymlink,
    /// Symlink found while following is disabled.
    SymlinkDisallowed,
    /// Directory found where a file was expected.
    Directory,
    /// Device node, socket, fifo or similar.
    NotAFile,
    /// Reading the file failed.
    Read,
    /// Manifest line could not be parsed.
    MalformedLine,
    /// File size differs from the manifest.
    SizeMismatch,
    /// File contents differ from the manifest.
    DigestMismatch,
    /// Error reported by the recursive walker.
    Walk,
}

/// A single entry that could not be processed. Never fatal to the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Path the failure refers to.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of failure.
    pub kind: FailureKind,
    /// Manifest name and 1-based line number, for verification failures.
    #[serde(default)]
    pub location: Option<Location>,
    /// Underlying I/O error, if any.
    #[serde(skip)]
    pub source: Option<Arc<std::io::Error>>,
}

/// Position of an entry inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Manifest name as given by the caller.
    pub manifest: String,
    /// 1-based line number.
    pub line: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.manifest, self.line)
    }
}

impl ItemFailure {
    /// Create a new item failure.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
            location: None,
            source: None,
        }
    }

    /// Attach an underlying I/O error.
    pub fn with_source(mut self, source: std::io::Error) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Attach a manifest location.
    pub fn at(mut self, manifest: impl Into<String>, line: usize) -> Self {
        self.location = Some(Location {
            manifest: manifest.into(),
            line,
        });
        self
    }

    /// `lstat`/`stat` failed.
    pub fn stat(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        Self::new(
            &path,
            format!("stat {}: {source}", path.display()),
            FailureKind::Stat,
        )
        .with_source(source)
    }

    /// Symlink could not be resolved.
    pub fn broken_symlink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        Self::new(
            &path,
            format!("{}: {source}", path.display()),
            FailureKind::BrokenSymlink,
        )
        .with_source(source)
    }

    /// Symlink skipped because following is disabled.
    pub fn symlink_disallowed(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(
            &path,
            format!("skipping symlink {}", path.display()),
            FailureKind::SymlinkDisallowed,
        )
    }

    /// Directory skipped.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(
            &path,
            format!("skipping dir {}..", path.display()),
            FailureKind::Directory,
        )
    }

    /// Special file skipped.
    pub fn not_a_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(
            &path,
            format!("skipping non-file {}..", path.display()),
            FailureKind::NotAFile,
        )
    }

    /// File could not be read or hashed.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        Self::new(
            &path,
            format!("can't hash {}: {source}", path.display()),
            FailureKind::Read,
        )
        .with_source(source)
    }

    /// 1-based manifest line this failure refers to, if any.
    pub fn line(&self) -> Option<usize> {
        self.location.as_ref().map(|l| l.line)
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ItemFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// All per-item failures of one run, in the order they were collected.
#[derive(Debug, Clone, Default, Error, Serialize, Deserialize)]
#[error("{}", render_failures(.0))]
pub struct FailureSet(pub Vec<ItemFailure>);

impl FailureSet {
    /// Merge collected failures; `None` when there were none.
    pub fn from_failures(failures: Vec<ItemFailure>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self(failures))
        }
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no failures.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the failures.
    pub fn iter(&self) -> impl Iterator<Item = &ItemFailure> {
        self.0.iter()
    }
}

fn render_failures(failures: &[ItemFailure]) -> String {
    failures.iter().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_io() {
        let err = PipelineError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, PipelineError::PermissionDenied { .. }));
    }

    #[test]
    fn test_item_failure_location() {
        let failure = ItemFailure::new("a.txt", "file modified 'a.txt'", FailureKind::DigestMismatch)
            .at("sums.txt", 7);
        assert_eq!(failure.line(), Some(7));
        assert_eq!(failure.to_string(), "sums.txt: 7: file modified 'a.txt'");
    }

    #[test]
    fn test_item_failure_source() {
        use std::error::Error;

        let failure = ItemFailure::read(
            "/gone",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(failure.kind, FailureKind::Read);
        assert!(failure.source().is_some());
    }

    #[test]
    fn test_failure_set_display() {
        assert!(FailureSet::from_failures(Vec::new()).is_none());

        let set = FailureSet::from_failures(vec![
            ItemFailure::directory("/a"),
            ItemFailure::symlink_disallowed("/b"),
        ])
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "skipping dir /a..\nskipping symlink /b");
    }
}
