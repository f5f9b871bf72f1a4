//! Digest computation and side-file verification.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use trellis_schema::{Checksum, ChecksumAlgorithm};

use crate::error::ResolveError;

fn digest_reader<D: Digest, R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex digest of the file at `path`.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn compute(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    let reader = BufReader::new(File::open(path)?);
    match algorithm {
        ChecksumAlgorithm::Md5 => digest_reader::<Md5, _>(reader),
        ChecksumAlgorithm::Sha1 => digest_reader::<Sha1, _>(reader),
        ChecksumAlgorithm::Sha256 => digest_reader::<Sha256, _>(reader),
        ChecksumAlgorithm::Sha512 => digest_reader::<Sha512, _>(reader),
    }
}

/// Check the file at `path` against an expected digest.
///
/// # Errors
///
/// Returns [`ResolveError::ChecksumMismatch`] on mismatch, or an I/O error.
pub fn verify(path: &Path, expected: &Checksum) -> Result<(), ResolveError> {
    let computed = compute(path, expected.algorithm())?;
    if computed == expected.as_str() {
        Ok(())
    } else {
        Err(ResolveError::ChecksumMismatch {
            algorithm: expected.algorithm(),
            expected: expected.as_str().to_string(),
            computed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("hello.txt");
        fs::write(&file, b"hello world").unwrap();

        assert_eq!(
            compute(&file, ChecksumAlgorithm::Md5).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            compute(&file, ChecksumAlgorithm::Sha1).unwrap(),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            compute(&file, ChecksumAlgorithm::Sha256).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_verify_mismatch() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("hello.txt");
        fs::write(&file, b"hello world").unwrap();

        let good = Checksum::new(ChecksumAlgorithm::Md5, "5eb63bbbe01eeed093cb22bb8f5acdc3").unwrap();
        assert!(verify(&file, &good).is_ok());

        let bad = Checksum::new(ChecksumAlgorithm::Md5, "00000000000000000000000000000000").unwrap();
        let err = verify(&file, &bad).unwrap_err();
        assert!(matches!(err, ResolveError::ChecksumMismatch { .. }));
    }
}
