//! JWalk-backed recursive walker.
//!
//! The walker only discovers entries; symlink resolution and duplicate
//! suppression are left to the dispatcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use globset::{Glob, GlobSet, GlobSetBuilder};
use jwalk::{Parallelism, WalkDir};

use fsum_core::{EntryFilter, FailureKind, FileRecord, ItemFailure, PipelineError, WalkOptions};

/// Lazily walks a set of roots, yielding `lstat` records or per-entry failures.
pub struct JwalkWalker {
    options: WalkOptions,
    excludes: Arc<GlobSet>,
}

impl JwalkWalker {
    /// Create a walker; fails if an exclusion pattern is not a valid glob.
    pub fn new(options: WalkOptions) -> Result<Self, PipelineError> {
        let excludes = build_globset(&options.excludes)?;
        Ok(Self {
            options,
            excludes: Arc::new(excludes),
        })
    }

    /// Walker options.
    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Stat every root. A root that cannot be stat'd is fatal to the run.
    pub fn check_roots(&self) -> Result<(), PipelineError> {
        if self.options.roots.is_empty() {
            return Err(PipelineError::NoInputs);
        }
        for root in &self.options.roots {
            std::fs::metadata(root).map_err(|e| PipelineError::io(root, e))?;
        }
        Ok(())
    }

    /// Walk all roots in order.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ItemFailure>> + '_ {
        self.options
            .roots
            .iter()
            .flat_map(move |root| self.walk_root(root))
    }

    fn walk_root(&self, root: &Path) -> Box<dyn Iterator<Item = Result<FileRecord, ItemFailure>> + '_> {
        let root_device = match std::fs::metadata(root) {
            Ok(m) => get_dev(&m),
            Err(err) => return Box::new(std::iter::once(Err(ItemFailure::stat(root, err)))),
        };

        let parallelism = match self.options.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let excludes = Arc::clone(&self.excludes);
        let one_filesystem = self.options.one_filesystem;

        let walker = WalkDir::new(root)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(self.options.follow_symlinks)
            .process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|entry| match entry {
                    Ok(e) => !excludes.is_match(&e.file_name),
                    Err(_) => true,
                });

                if one_filesystem {
                    for entry in children.iter_mut().flatten() {
                        if entry.file_type.is_dir() {
                            let same_fs = entry
                                .metadata()
                                .map(|m| get_dev(&m) == root_device)
                                .unwrap_or(false);
                            if !same_fs {
                                entry.read_children_path = None;
                            }
                        }
                    }
                }
            });

        let filter = self.options.entry_filter;
        Box::new(walker.into_iter().filter_map(move |entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    return Some(Err(ItemFailure::new(
                        path,
                        err.to_string(),
                        FailureKind::Walk,
                    )));
                }
            };

            let file_type = entry.file_type();
            let wanted = match filter {
                EntryFilter::File => file_type.is_file(),
                EntryFilter::Symlink => entry.path_is_symlink(),
                // Followed links to directories are descended into instead
                EntryFilter::FileOrSymlink => {
                    file_type.is_file() || (entry.path_is_symlink() && !file_type.is_dir())
                }
                EntryFilter::Any => !file_type.is_dir(),
            };
            if !wanted {
                return None;
            }

            let path: PathBuf = entry.path();
            Some(FileRecord::lstat(&path).map_err(|err| ItemFailure::stat(&path, err)))
        }))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, PipelineError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| PipelineError::InvalidConfig {
            message: format!("bad exclude pattern '{pattern}': {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| PipelineError::InvalidConfig {
        message: e.to_string(),
    })
}

#[cfg(unix)]
fn get_dev(metadata: &std::fs::Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &std::fs::Metadata) -> u64 {
    0
}
