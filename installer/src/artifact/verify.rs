//! Integrity verification of staged artifacts.
//!
//! Verification is read-only: it computes the digest of a staged file and
//! reports how it compares with the manifest. Deciding what to do with a
//! mismatched file is left to the caller.

use crate::manifest::Sha256Digest;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Read buffer size used when hashing.
const CHUNK_SIZE: usize = 8 * 1024;

/// Errors arising while verifying a staged artifact.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The staged file could not be read.
    #[error("failed to read {path} for verification: {source}")]
    Read {
        /// The file that was being hashed.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
}

/// Outcome of comparing a staged file against its expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Digest declared by the manifest.
    pub expected: Sha256Digest,
    /// Digest of the bytes on disk.
    pub actual: Sha256Digest,
}

impl Verification {
    /// Return `true` when the staged bytes match the declaration.
    #[must_use]
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }
}

/// Compute the SHA-256 digest of the file at `path`.
///
/// # Errors
///
/// Returns [`VerifyError::Read`] if the file cannot be opened or read.
pub fn compute_sha256(path: &Path) -> Result<Sha256Digest, VerifyError> {
    let read_error = |source| VerifyError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer).map_err(read_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Sha256Digest::from_bytes(&hasher.finalize().into()))
}

/// Hash `path` and compare it against `expected`.
///
/// The file is never modified or removed.
///
/// # Errors
///
/// Returns [`VerifyError::Read`] if the file cannot be read.
pub fn verify(path: &Path, expected: &Sha256Digest) -> Result<Verification, VerifyError> {
    let actual = compute_sha256(path)?;
    Ok(Verification {
        expected: expected.clone(),
        actual,
    })
}
