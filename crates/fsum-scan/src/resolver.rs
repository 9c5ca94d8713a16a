//! Classification of raw input paths into admissible files.

use std::path::{Path, PathBuf};

use fsum_core::{FileKind, FileRecord, ItemFailure};
use tracing::debug;

use crate::inode::InodeTracker;

/// Outcome of resolving one path.
#[derive(Debug)]
pub enum Resolution {
    /// A regular file that should be processed.
    Admit(FileRecord),
    /// The object was already admitted through another path.
    SkipSeen(PathBuf),
    /// A symlink, and link-following is disabled.
    SkipSymlinkDisallowed(PathBuf),
    /// A directory or special file.
    SkipNonFile(FileRecord),
    /// The path could not be stat'd or its symlink chain could not be resolved.
    Error(ItemFailure),
}

impl Resolution {
    /// Diagnostic to report for this outcome, if any.
    ///
    /// Seen entries are dropped silently; everything else that is not
    /// admitted becomes a non-fatal failure.
    pub fn into_failure(self) -> Option<ItemFailure> {
        match self {
            Resolution::Admit(_) | Resolution::SkipSeen(_) => None,
            Resolution::SkipSymlinkDisallowed(path) => Some(ItemFailure::symlink_disallowed(path)),
            Resolution::SkipNonFile(record) if record.kind.is_dir() => {
                Some(ItemFailure::directory(record.path))
            }
            Resolution::SkipNonFile(record) => Some(ItemFailure::not_a_file(record.path)),
            Resolution::Error(failure) => Some(failure),
        }
    }
}

/// Resolves paths against a traversal-scoped [`InodeTracker`].
#[derive(Debug)]
pub struct EntryResolver<'a> {
    tracker: &'a InodeTracker,
    follow_symlinks: bool,
}

impl<'a> EntryResolver<'a> {
    /// Create a resolver backed by `tracker`.
    pub fn new(tracker: &'a InodeTracker, follow_symlinks: bool) -> Self {
        Self {
            tracker,
            follow_symlinks,
        }
    }

    /// `lstat` and classify `path`, registering every newly sighted inode.
    pub fn resolve(&self, path: &Path) -> Resolution {
        match FileRecord::lstat(path) {
            Ok(record) => self.classify(record),
            Err(err) => Resolution::Error(ItemFailure::stat(path, err)),
        }
    }

    /// Classify an already `lstat`'d record.
    pub fn classify(&self, record: FileRecord) -> Resolution {
        if self.tracker.seen(record.key, &record) {
            debug!(path = %record.path.display(), key = %record.key, "already seen");
            return Resolution::SkipSeen(record.path);
        }

        let record = if record.kind.is_symlink() {
            if !self.follow_symlinks {
                return Resolution::SkipSymlinkDisallowed(record.path);
            }
            match self.follow(&record.path) {
                Ok(Some(target)) => target,
                Ok(None) => return Resolution::SkipSeen(record.path),
                Err(failure) => return Resolution::Error(failure),
            }
        } else {
            record
        };

        match record.kind {
            FileKind::File => Resolution::Admit(record),
            _ => Resolution::SkipNonFile(record),
        }
    }

    /// Resolve a whole symlink chain and `stat` its target.
    ///
    /// Returns `Ok(None)` when the target was already seen, which is how
    /// links looping back into visited files terminate.
    fn follow(&self, link: &Path) -> Result<Option<FileRecord>, ItemFailure> {
        let target = std::fs::canonicalize(link)
            .map_err(|err| ItemFailure::broken_symlink(link, err))?;
        let record = FileRecord::stat(&target).map_err(|err| ItemFailure::stat(&target, err))?;

        if self.tracker.seen(record.key, &record) {
            debug!(link = %link.display(), target = %target.display(), "symlink target already seen");
            return Ok(None);
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsum_core::FailureKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_admit_regular_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "hello").unwrap();

        let tracker = InodeTracker::new();
        let resolver = EntryResolver::new(&tracker, false);

        match resolver.resolve(&file) {
            Resolution::Admit(record) => assert_eq!(record.size, 5),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(resolver.resolve(&file), Resolution::SkipSeen(_)));
    }

    #[test]
    fn test_directory_is_rejected() {
        let temp = TempDir::new().unwrap();
        let tracker = InodeTracker::new();
        let resolver = EntryResolver::new(&tracker, false);

        let failure = resolver.resolve(temp.path()).into_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Directory);
        assert!(failure.message.starts_with("skipping dir"));
    }

    #[test]
    fn test_missing_path_is_error() {
        let temp = TempDir::new().unwrap();
        let tracker = InodeTracker::new();
        let resolver = EntryResolver::new(&tracker, true);

        let resolution = resolver.resolve(&temp.path().join("nope"));
        let failure = resolution.into_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Stat);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_disallowed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("target"), "x").unwrap();
        std::os::unix::fs::symlink(root.join("target"), root.join("link")).unwrap();

        let tracker = InodeTracker::new();
        let resolver = EntryResolver::new(&tracker, false);

        let resolution = resolver.resolve(&root.join("link"));
        assert!(matches!(resolution, Resolution::SkipSymlinkDisallowed(_)));
        assert_eq!(
            resolution.into_failure().unwrap().kind,
            FailureKind::SymlinkDisallowed
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_followed_to_resolved_path() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("target"), "x").unwrap();
        std::os::unix::fs::symlink(root.join("target"), root.join("link")).unwrap();

        let tracker = InodeTracker::new();
        let resolver = EntryResolver::new(&tracker, true);

        match resolver.resolve(&root.join("link")) {
            Resolution::Admit(record) => {
                assert_eq!(record.path, fs::canonicalize(root.join("target")).unwrap());
            }
            other => panic!("unexpected {other:?}"),
        }
        // The target itself is now a duplicate
        assert!(matches!(
            resolver.resolve(&root.join("target")),
            Resolution::SkipSeen(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::os::unix::fs::symlink(root.join("b"), root.join("a")).unwrap();
        std::os::unix::fs::symlink(root.join("a"), root.join("b")).unwrap();

        let tracker = InodeTracker::new();
        let resolver = EntryResolver::new(&tracker, true);

        for name in ["a", "b"] {
            match resolver.resolve(&root.join(name)) {
                Resolution::Error(failure) => assert_eq!(failure.kind, FailureKind::BrokenSymlink),
                Resolution::SkipSeen(_) => {}
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::os::unix::fs::symlink(root.join("missing"), root.join("dangling")).unwrap();

        let tracker = InodeTracker::new();
        let resolver = EntryResolver::new(&tracker, true);

        let failure = resolver.resolve(&root.join("dangling")).into_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::BrokenSymlink);
    }
}
