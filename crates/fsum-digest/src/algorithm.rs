//! Hash algorithm registry.
//!
//! Every algorithm is exposed through the same [`HashState`] accumulator.
//! Keyed constructions (BLAKE2, BLAKE3) use an all-zero 32-byte key so
//! digests are reproducible across runs.

use std::str::FromStr;

use blake2::digest::consts::U32;
use blake2::digest::{KeyInit, Mac};
use blake2::{Blake2bMac, Blake2bMac512, Blake2sMac256};
use serde::{Serialize, Serializer};
use sha2::{Digest as _, Sha256, Sha512};
use sha3::{Sha3_256, Sha3_512};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use fsum_core::PipelineError;

/// Fixed key for keyed constructions.
const ZERO_KEY: [u8; 32] = [0u8; 32];

/// Stateful hash accumulator.
pub trait HashState: Send {
    /// Feed more bytes. May be called any number of times.
    fn write(&mut self, data: &[u8]);

    /// Finalize and return the digest.
    fn sum(self: Box<Self>) -> Vec<u8>;
}

struct Plain<D>(D);

impl<D> HashState for Plain<D>
where
    D: sha2::Digest + Send,
{
    fn write(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn sum(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

struct Keyed<M>(M);

impl<M> HashState for Keyed<M>
where
    M: Mac + Send,
{
    fn write(&mut self, data: &[u8]) {
        Mac::update(&mut self.0, data);
    }

    fn sum(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().into_bytes().to_vec()
    }
}

struct Blake3(blake3::Hasher);

impl HashState for Blake3 {
    fn write(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn sum(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().as_bytes().to_vec()
    }
}

/// Supported hash algorithms. The string form is what the manifest header
/// and the command line use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, EnumString, IntoStaticStr,
)]
pub enum Algorithm {
    #[default]
    #[strum(to_string = "sha256")]
    Sha256,
    #[strum(to_string = "sha512")]
    Sha512,
    /// Alias of SHA3-512.
    #[strum(to_string = "sha3")]
    Sha3,
    #[strum(to_string = "sha3-256")]
    Sha3_256,
    #[strum(to_string = "sha3-512")]
    Sha3_512,
    /// Keyed BLAKE2s, 256-bit output.
    #[strum(to_string = "blake2s")]
    Blake2s,
    /// Keyed BLAKE2b, 512-bit output.
    #[strum(to_string = "blake2b")]
    Blake2b,
    #[strum(to_string = "blake2b-256")]
    Blake2b256,
    #[strum(to_string = "blake2b-512")]
    Blake2b512,
    /// Keyed BLAKE3.
    #[strum(to_string = "blake3")]
    Blake3,
}

impl Algorithm {
    /// Look up an algorithm by name. Unknown names are a setup error.
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        Self::from_str(name).map_err(|_| PipelineError::UnknownAlgorithm {
            name: name.to_string(),
        })
    }

    /// Registry name.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// All registered algorithms, in listing order.
    pub fn all() -> impl Iterator<Item = Algorithm> {
        Self::iter()
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Algorithm::Sha256
            | Algorithm::Sha3_256
            | Algorithm::Blake2s
            | Algorithm::Blake2b256
            | Algorithm::Blake3 => 32,
            Algorithm::Sha512 | Algorithm::Sha3 | Algorithm::Sha3_512 => 64,
            Algorithm::Blake2b | Algorithm::Blake2b512 => 64,
        }
    }

    /// Construct a fresh accumulator.
    pub fn hasher(&self) -> Result<Box<dyn HashState>, PipelineError> {
        let state: Box<dyn HashState> = match self {
            Algorithm::Sha256 => Box::new(Plain(Sha256::new())),
            Algorithm::Sha512 => Box::new(Plain(Sha512::new())),
            Algorithm::Sha3 | Algorithm::Sha3_512 => Box::new(Plain(Sha3_512::new())),
            Algorithm::Sha3_256 => Box::new(Plain(Sha3_256::new())),
            Algorithm::Blake2s => Box::new(Keyed(self.keyed::<Blake2sMac256>()?)),
            Algorithm::Blake2b | Algorithm::Blake2b512 => {
                Box::new(Keyed(self.keyed::<Blake2bMac512>()?))
            }
            Algorithm::Blake2b256 => Box::new(Keyed(self.keyed::<Blake2bMac<U32>>()?)),
            Algorithm::Blake3 => Box::new(Blake3(blake3::Hasher::new_keyed(&ZERO_KEY))),
        };
        Ok(state)
    }

    fn keyed<M: KeyInit>(&self) -> Result<M, PipelineError> {
        M::new_from_slice(&ZERO_KEY).map_err(|e| PipelineError::KeyInit {
            algorithm: self.name().to_string(),
            message: e.to_string(),
        })
    }
}

impl Serialize for Algorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_hex(algorithm: Algorithm, data: &[u8]) -> String {
        let mut state = algorithm.hasher().unwrap();
        state.write(data);
        state
            .sum()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    #[test]
    fn test_names_round_trip() {
        for algorithm in Algorithm::all() {
            assert_eq!(Algorithm::from_name(algorithm.name()).unwrap(), algorithm);
        }
        assert_eq!(Algorithm::default().name(), "sha256");
    }

    #[test]
    fn test_unknown_name() {
        assert!(matches!(
            Algorithm::from_name("md5"),
            Err(PipelineError::UnknownAlgorithm { .. })
        ));
    }

    #[test]
    fn test_output_lengths() {
        for algorithm in Algorithm::all() {
            let mut state = algorithm.hasher().unwrap();
            state.write(b"abc");
            assert_eq!(state.sum().len(), algorithm.output_len(), "{algorithm}");
        }
    }

    #[test]
    fn test_sha256_known_answer() {
        assert_eq!(
            digest_hex(Algorithm::Sha256, b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha3_alias() {
        assert_eq!(
            digest_hex(Algorithm::Sha3, b"data"),
            digest_hex(Algorithm::Sha3_512, b"data")
        );
    }

    #[test]
    fn test_keyed_differs_from_unkeyed() {
        let keyed = digest_hex(Algorithm::Blake3, b"abc");
        let unkeyed = blake3::hash(b"abc").to_hex().to_string();
        assert_ne!(keyed, unkeyed);
        // Deterministic
        assert_eq!(keyed, digest_hex(Algorithm::Blake3, b"abc"));
    }

    #[test]
    fn test_split_writes_match_single_write() {
        for algorithm in Algorithm::all() {
            let mut state = algorithm.hasher().unwrap();
            state.write(b"hello ");
            state.write(b"world");
            assert_eq!(state.sum(), {
                let mut whole = algorithm.hasher().unwrap();
                whole.write(b"hello world");
                whole.sum()
            });
        }
    }
}
