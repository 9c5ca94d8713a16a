//! File records and identity types.

use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use serde::{Deserialize, Serialize};

/// Identity of a filesystem object, independent of the path used to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InodeKey {
    /// Device ID of the containing filesystem.
    pub device: u64,
    /// Device ID of the object itself (special files only).
    pub rdev: u64,
    /// Inode number.
    pub inode: u64,
}

impl InodeKey {
    /// Create a new inode key.
    pub fn new(device: u64, rdev: u64, inode: u64) -> Self {
        Self {
            device,
            rdev,
            inode,
        }
    }

    /// Build the key from file metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self::new(get_dev(metadata), get_rdev(metadata), get_ino(metadata))
    }
}

impl fmt::Display for InodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.device, self.rdev, self.inode)
    }
}

/// Type of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Other file types (sockets, devices, fifos).
    Other,
}

impl FileKind {
    /// Classify from metadata. Follows whatever `stat` flavour produced it.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let ft = metadata.file_type();
        if ft.is_symlink() {
            FileKind::Symlink
        } else if ft.is_dir() {
            FileKind::Directory
        } else if ft.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        }
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileKind::File)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileKind::Directory)
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileKind::Symlink)
    }
}

/// A stat'd filesystem entry. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path used to reach the entry (the resolved path for followed symlinks).
    pub path: PathBuf,
    /// Filesystem identity.
    pub key: InodeKey,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Entry type.
    pub kind: FileKind,
}

impl FileRecord {
    /// Create a record from a path and its metadata.
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        Self {
            path: path.into(),
            key: InodeKey::from_metadata(metadata),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(std::time::UNIX_EPOCH),
            kind: FileKind::from_metadata(metadata),
        }
    }

    /// `lstat` a path and build its record.
    pub fn lstat(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::symlink_metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// `stat` a path (following symlinks) and build its record.
    pub fn stat(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// Check if this record is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }
}

/// Content digest produced by a hash algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub Vec<u8>);

impl Digest {
    /// Create a new digest from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Decode a hex string (either case). Returns `None` on odd length or bad digits.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.as_bytes();
        if hex.len() % 2 != 0 {
            return None;
        }

        hex.chunks_exact(2)
            .map(|pair| Some((hex_val(pair[0])? << 4) | hex_val(pair[1])?))
            .collect::<Option<Vec<u8>>>()
            .map(Self)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Digest length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the digest is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// Cross-platform metadata helpers

#[cfg(unix)]
fn get_dev(metadata: &Metadata) -> u64 {
    metadata.dev()
}

#[cfg(not(unix))]
fn get_dev(_metadata: &Metadata) -> u64 {
    0
}

#[cfg(unix)]
fn get_rdev(metadata: &Metadata) -> u64 {
    metadata.rdev()
}

#[cfg(not(unix))]
fn get_rdev(_metadata: &Metadata) -> u64 {
    0
}

#[cfg(unix)]
fn get_ino(metadata: &Metadata) -> u64 {
    metadata.ino()
}

#[cfg(not(unix))]
fn get_ino(_metadata: &Metadata) -> u64 {
    0 // No inode numbers; dedup degrades to path identity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex() {
        let digest = Digest::new([0xab; 32]);
        assert_eq!(digest.to_hex().len(), 64);
        assert!(digest.to_hex().starts_with("abab"));
    }

    #[test]
    fn test_digest_from_hex() {
        let digest = Digest::from_hex("00ffA5").unwrap();
        assert_eq!(digest.as_bytes(), &[0x00, 0xff, 0xa5]);
        assert_eq!(digest.to_hex(), "00ffa5");

        assert!(Digest::from_hex("abc").is_none());
        assert!(Digest::from_hex("zz").is_none());
    }

    #[test]
    fn test_inode_key_display() {
        let key = InodeKey::new(1, 0, 42);
        assert_eq!(key.to_string(), "1:0:42");
    }

    #[test]
    fn test_record_from_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), b"hello").unwrap();

        let record = FileRecord::lstat(temp.path()).unwrap();
        assert!(record.is_file());
        assert_eq!(record.size, 5);
        assert_eq!(record.path, temp.path());
    }
}
