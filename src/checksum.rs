//! Checksum utilities for stamp integrity verification

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Digest used to compare byte streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// What the alert tooling has always compared stamps with
    #[default]
    Md5,
    Sha256,
}

/// Hex digest of some content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl Checksum {
    /// Compute an MD5 checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::compute(DigestAlgorithm::Md5, data)
    }

    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let hex = match algorithm {
            DigestAlgorithm::Md5 => format!("{:x}", Md5::digest(data)),
            DigestAlgorithm::Sha256 => format!("{:x}", Sha256::digest(data)),
        };
        Self { algorithm, hex }
    }

    /// Read the whole file and digest it
    pub fn of_file(algorithm: DigestAlgorithm, path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(Self::compute(algorithm, &data))
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(self.algorithm, data) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Whether two byte slices have the same digest
pub fn bytes_match(algorithm: DigestAlgorithm, a: &[u8], b: &[u8]) -> bool {
    Checksum::compute(algorithm, a) == Checksum::compute(algorithm, b)
}

/// Whether two files have the same digest. A mismatch is `Ok(false)`.
pub fn files_match(algorithm: DigestAlgorithm, a: impl AsRef<Path>, b: impl AsRef<Path>) -> Result<bool> {
    Ok(Checksum::of_file(algorithm, a)? == Checksum::of_file(algorithm, b)?)
}

/// Compare the MD5 digests of two files
pub fn check_md5(a: impl AsRef<Path>, b: impl AsRef<Path>) -> Result<bool> {
    files_match(DigestAlgorithm::Md5, a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_known_md5() {
        let checksum = Checksum::from_bytes(b"");
        assert_eq!(checksum.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_checksum_different_content() {
        let checksum1 = Checksum::from_bytes(b"stamp one");
        let checksum2 = Checksum::from_bytes(b"stamp two");
        assert_ne!(checksum1, checksum2);
    }

    #[test]
    fn test_checksum_verification() {
        let checksum = Checksum::compute(DigestAlgorithm::Sha256, b"cutout");
        assert_eq!(checksum.as_str().len(), 64);
        assert!(checksum.verify(b"cutout"));
        assert!(!checksum.verify(b"different content"));
    }

    #[test]
    fn test_bytes_match() {
        assert!(bytes_match(DigestAlgorithm::Md5, b"abc", b"abc"));
        assert!(!bytes_match(DigestAlgorithm::Sha256, b"abc", b"abd"));
    }

    #[test]
    fn test_files_match() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        let c = dir.path().join("c.jpg");
        fs::write(&a, [1u8, 2, 3]).unwrap();
        fs::write(&b, [1u8, 2, 3]).unwrap();
        fs::write(&c, [3u8, 2, 1]).unwrap();

        assert!(check_md5(&a, &b).unwrap());
        assert!(!check_md5(&a, &c).unwrap());
        assert!(files_match(DigestAlgorithm::Sha256, &a, &b).unwrap());
        assert!(check_md5(&a, dir.path().join("missing")).is_err());
    }
}
