//! Whole-file hashing.
//!
//! Large files are hashed through fixed-size memory-mapped windows, small
//! files through a reusable read buffer. Neither path holds the whole file
//! on the heap.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use fsum_core::{Digest, PipelineError};

use crate::algorithm::{Algorithm, HashState};

/// Files larger than this are memory-mapped.
const MMAP_THRESHOLD: u64 = 128 * 1024;

/// Size of one mapped window. A multiple of every common page size.
const MMAP_WINDOW: u64 = 64 * 1024 * 1024;

/// Read buffer for small files.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Hashes files with one algorithm.
#[derive(Debug, Clone, Copy)]
pub struct FileHasher {
    algorithm: Algorithm,
}

impl FileHasher {
    /// Create a hasher, checking once that the algorithm can be constructed.
    pub fn new(algorithm: Algorithm) -> Result<Self, PipelineError> {
        algorithm.hasher()?;
        Ok(Self { algorithm })
    }

    /// The algorithm in use.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Hash the full contents of `path`, returning the digest and the number
    /// of bytes consumed.
    pub fn hash_file(&self, path: &Path) -> io::Result<(Digest, u64)> {
        let mut state = self.algorithm.hasher().map_err(io::Error::other)?;
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();

        let consumed = if len > MMAP_THRESHOLD {
            hash_mapped(&mut file, len, MMAP_WINDOW, state.as_mut(), map_window)?
        } else {
            hash_buffered(&mut file, state.as_mut())?
        };

        Ok((Digest::new(state.sum()), consumed))
    }
}

/// Convenience wrapper for a one-off hash.
pub fn hash_file(path: &Path, algorithm: Algorithm) -> io::Result<(Digest, u64)> {
    FileHasher::new(algorithm)
        .map_err(io::Error::other)?
        .hash_file(path)
}

fn map_window(file: &File, offset: u64, len: usize) -> io::Result<Mmap> {
    // SAFETY: the map is read-only and dropped before the next window.
    // Concurrent truncation by another process is not guarded against.
    unsafe { MmapOptions::new().offset(offset).len(len).map(file) }
}

/// Hash `len` bytes window by window. If a window cannot be mapped, the rest
/// of the file is read from that offset through the buffered path.
fn hash_mapped<M>(
    file: &mut File,
    len: u64,
    window: u64,
    state: &mut dyn HashState,
    map: M,
) -> io::Result<u64>
where
    M: Fn(&File, u64, usize) -> io::Result<Mmap>,
{
    let mut offset = 0u64;
    while offset < len {
        let size = (len - offset).min(window) as usize;
        let mapped = match map(file, offset, size) {
            Ok(mapped) => mapped,
            Err(e) => {
                debug!(offset, error = %e, "mmap failed, reading instead");
                file.seek(SeekFrom::Start(offset))?;
                return Ok(offset + hash_buffered(file, state)?);
            }
        };
        state.write(&mapped);
        offset += size as u64;
    }
    Ok(offset)
}

fn hash_buffered<R: Read>(reader: &mut R, state: &mut dyn HashState) -> io::Result<u64> {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut consumed = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        state.write(&buffer[..n]);
        consumed += n as u64;
    }

    Ok(consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn reference(algorithm: Algorithm, data: &[u8]) -> Digest {
        let mut state = algorithm.hasher().unwrap();
        state.write(data);
        Digest::new(state.sum())
    }

    #[test]
    fn test_small_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("small");
        fs::write(&path, b"hello world").unwrap();

        let (digest, size) = hash_file(&path, Algorithm::Sha256).unwrap();
        assert_eq!(size, 11);
        assert_eq!(digest, reference(Algorithm::Sha256, b"hello world"));
    }

    #[test]
    fn test_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        fs::write(&path, b"").unwrap();

        let (digest, size) = hash_file(&path, Algorithm::Blake3).unwrap();
        assert_eq!(size, 0);
        assert_eq!(digest, reference(Algorithm::Blake3, b""));
    }

    #[test]
    fn test_mapped_file_matches_in_memory_digest() {
        let temp = TempDir::new().unwrap();
        let (path, data) = large_file(&temp);

        for algorithm in [Algorithm::Sha512, Algorithm::Blake2b, Algorithm::Blake3] {
            let (digest, size) = hash_file(&path, algorithm).unwrap();
            assert_eq!(size, data.len() as u64);
            assert_eq!(digest, reference(algorithm, &data));
        }
    }

    fn large_file(temp: &TempDir) -> (std::path::PathBuf, Vec<u8>) {
        let path = temp.path().join("large");
        let data: Vec<u8> = (0..(MMAP_THRESHOLD as usize * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        fs::write(&path, &data).unwrap();
        (path, data)
    }

    #[test]
    fn test_unmappable_file_falls_back_to_reads() {
        let temp = TempDir::new().unwrap();
        let (path, data) = large_file(&temp);

        let mut file = File::open(&path).unwrap();
        let mut state = Algorithm::Sha256.hasher().unwrap();
        let consumed = hash_mapped(
            &mut file,
            data.len() as u64,
            MMAP_WINDOW,
            state.as_mut(),
            |_, _, _| Err(io::Error::new(io::ErrorKind::Unsupported, "no mmap here")),
        )
        .unwrap();

        assert_eq!(consumed, data.len() as u64);
        assert_eq!(Digest::new(state.sum()), reference(Algorithm::Sha256, &data));
    }

    #[test]
    fn test_mapping_failure_mid_file_resumes_at_offset() {
        let temp = TempDir::new().unwrap();
        let (path, data) = large_file(&temp);
        let window = MMAP_THRESHOLD;

        let mut file = File::open(&path).unwrap();
        let mut state = Algorithm::Blake3.hasher().unwrap();
        let consumed = hash_mapped(
            &mut file,
            data.len() as u64,
            window,
            state.as_mut(),
            |file, offset, len| {
                if offset == 0 {
                    map_window(file, offset, len)
                } else {
                    Err(io::Error::other("map refused"))
                }
            },
        )
        .unwrap();

        assert_eq!(consumed, data.len() as u64);
        assert_eq!(Digest::new(state.sum()), reference(Algorithm::Blake3, &data));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = hash_file(&temp.path().join("gone"), Algorithm::Sha256).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
