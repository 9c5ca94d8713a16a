//! Checksums, manifests and verification for fsum.
//!
//! [`Generator`] hashes every file admitted by a [`fsum_scan::Traversal`]
//! into a manifest; [`Verifier`] reads a manifest back and re-checks each
//! entry on the same worker pool.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::io::Cursor;
//! use std::path::PathBuf;
//! use fsum_digest::{Algorithm, Generator, PipelineConfig, Verifier};
//!
//! let generator = Generator::new(PipelineConfig::default(), Algorithm::Sha256);
//! let (report, manifest) = generator
//!     .run(&[PathBuf::from("Cargo.toml")], Vec::new())
//!     .unwrap();
//! assert!(report.is_ok());
//!
//! let verified = Verifier::new(PipelineConfig::default())
//!     .verify("manifest", Cursor::new(manifest))
//!     .unwrap();
//! assert_eq!(verified.exit_code(), 0);
//! ```

mod algorithm;
mod generate;
mod hasher;
mod manifest;
mod quote;
mod verify;

pub use algorithm::{Algorithm, HashState};
pub use generate::{Generator, HashReport};
pub use hasher::{FileHasher, hash_file};
pub use manifest::{
    MAGIC, ManifestEntry, ManifestHeader, ManifestReader, ManifestWriter, VERSION, parse_line,
};
pub use quote::{needs_quoting, quote_path, unquote_path};
pub use verify::{Verifier, VerifyReport};

// Re-export core types for convenience
pub use fsum_core::{Digest, FailureKind, FailureSet, ItemFailure, PipelineConfig, PipelineError};
