//! Self-describing integrity digests.
//!
//! A digest is the canonical string `<algorithm>-<base64-hash>`. It is the
//! sole identity of a blob: two digests are equal iff their canonical forms
//! are byte-identical.

use std::fmt;

use base64::prelude::{Engine as _, BASE64_STANDARD, BASE64_STANDARD_NO_PAD};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256, Sha512};

use crate::error::IntegrityError;

/// Supported hashing algorithms for blob content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Get the string representation of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Parse an algorithm name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Hash `data` with this algorithm.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed integrity digest.
///
/// Holds the algorithm and the raw hash bytes; `Display` renders the
/// canonical `<algorithm>-<base64>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Integrity {
    algorithm: HashAlgorithm,
    hash: Vec<u8>,
}

impl Integrity {
    /// Parse a digest string.
    ///
    /// Accepts both padded and unpadded base64; the canonical form produced
    /// by `Display` is always padded.
    ///
    /// # Errors
    /// Returns an error for a missing separator, an unknown algorithm, or
    /// invalid base64.
    pub fn parse(s: &str) -> Result<Self, IntegrityError> {
        let (alg, b64) = s
            .split_once('-')
            .ok_or_else(|| IntegrityError::MissingSeparator(s.to_string()))?;
        let algorithm: HashAlgorithm = HashAlgorithm::parse(alg)
            .ok_or_else(|| IntegrityError::UnsupportedAlgorithm(alg.to_string()))?;
        let hash: Vec<u8> = BASE64_STANDARD
            .decode(b64)
            .or_else(|_| BASE64_STANDARD_NO_PAD.decode(b64))
            .map_err(IntegrityError::InvalidBase64)?;
        Ok(Self { algorithm, hash })
    }

    /// Compute the digest of `data`.
    pub fn from_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            hash: algorithm.digest(data),
        }
    }

    /// Get the algorithm.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Check whether `data` hashes to this digest.
    pub fn matches(&self, data: &[u8]) -> bool {
        self.algorithm.digest(data) == self.hash
    }

    /// Hex encoding of the raw hash bytes (used by the on-disk cache layout).
    pub fn hex(&self) -> String {
        hex::encode(&self.hash)
    }

    /// Derive a stable inode number from the digest.
    ///
    /// # Returns
    /// The first 8 hash bytes as a little-endian u64.
    pub fn ino(&self) -> u64 {
        let mut bytes: [u8; 8] = [0u8; 8];
        let n: usize = self.hash.len().min(8);
        bytes[..n].copy_from_slice(&self.hash[..n]);
        u64::from_le_bytes(bytes)
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm, BASE64_STANDARD.encode(&self.hash))
    }
}

impl Serialize for Integrity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Integrity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = String::deserialize(deserializer)?;
        Integrity::parse(&s).map_err(D::Error::custom)
    }
}
