//! Inode tracking for hardlink and symlink-cycle deduplication.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fsum_core::{FileRecord, InodeKey};

/// Tracks admitted filesystem objects for the duration of one traversal.
///
/// A file reachable through several hardlinks or symlinks is admitted once:
/// the first record stored for a key wins and every later lookup reports it
/// as already seen. Safe for concurrent use.
#[derive(Debug, Default)]
pub struct InodeTracker {
    seen: DashMap<InodeKey, FileRecord>,
}

impl InodeTracker {
    /// Create a new inode tracker.
    pub fn new() -> Self {
        Self {
            seen: DashMap::new(),
        }
    }

    /// Check-and-set. Returns `true` if `key` was already tracked.
    ///
    /// If the key is new, `candidate` is stored and `false` is returned.
    /// An existing record is never replaced.
    pub fn seen(&self, key: InodeKey, candidate: &FileRecord) -> bool {
        match self.seen.entry(key) {
            Entry::Occupied(_) => true,
            Entry::Vacant(slot) => {
                slot.insert(candidate.clone());
                false
            }
        }
    }

    /// Check if a key has been tracked (without tracking).
    pub fn has_seen(&self, key: &InodeKey) -> bool {
        self.seen.contains_key(key)
    }

    /// Path of the record first stored for `key`.
    pub fn first_path(&self, key: &InodeKey) -> Option<std::path::PathBuf> {
        self.seen.get(key).map(|r| r.path.clone())
    }

    /// Get the number of unique objects tracked.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if nothing has been tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsum_core::FileKind;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn record(path: &str, key: InodeKey) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            key,
            size: 0,
            modified: std::time::UNIX_EPOCH,
            kind: FileKind::File,
        }
    }

    #[test]
    fn test_seen_new_inode() {
        let tracker = InodeTracker::new();
        let key = InodeKey::new(1, 0, 12345);

        assert!(!tracker.seen(key, &record("/a", key)));
        assert!(tracker.seen(key, &record("/b", key))); // Second time reports seen
    }

    #[test]
    fn test_first_writer_wins() {
        let tracker = InodeTracker::new();
        let key = InodeKey::new(1, 0, 7);

        tracker.seen(key, &record("/first", key));
        tracker.seen(key, &record("/second", key));

        assert_eq!(tracker.first_path(&key), Some(PathBuf::from("/first")));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_has_seen() {
        let tracker = InodeTracker::new();
        let key = InodeKey::new(1, 0, 12345);

        assert!(!tracker.has_seen(&key));
        tracker.seen(key, &record("/a", key));
        assert!(tracker.has_seen(&key));
    }

    #[test]
    fn test_different_devices() {
        let tracker = InodeTracker::new();
        let key1 = InodeKey::new(1, 0, 12345);
        let key2 = InodeKey::new(2, 0, 12345); // Same inode, different device

        assert!(!tracker.seen(key1, &record("/a", key1)));
        assert!(!tracker.seen(key2, &record("/b", key2)));
    }

    #[test]
    fn test_concurrent_admission_is_exclusive() {
        let tracker = Arc::new(InodeTracker::new());
        let key = InodeKey::new(3, 0, 99);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || !tracker.seen(key, &record(&format!("/p{i}"), key)))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|first| *first)
            .count();
        assert_eq!(admitted, 1);
    }
}
