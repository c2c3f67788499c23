//! SHA-1 content hashing for download verification.
//!
//! Mod manifests publish SHA-1 digests for package archives and for every
//! file inside them. Digests are lowercase hex; comparisons ignore case.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

use super::error::{SyncError, SyncResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the SHA-1 digest of a byte buffer.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}

/// Calculate the SHA-1 digest of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn file_content_hash(path: &Path) -> SyncResult<String> {
    let mut file = File::open(path).map_err(|e| SyncError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| SyncError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare two hex digests, ignoring case and surrounding whitespace.
pub fn hashes_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Verify a byte buffer against an expected digest.
///
/// # Returns
///
/// The actual digest if it matches, or a `ChecksumMismatch` naming `filename`.
pub fn verify_bytes(filename: &str, bytes: &[u8], expected: &str) -> SyncResult<String> {
    let actual = content_hash(bytes);
    if !hashes_match(expected, &actual) {
        return Err(SyncError::ChecksumMismatch {
            filename: filename.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const HELLO_WORLD_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
    const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn test_content_hash() {
        assert_eq!(content_hash(b"hello world"), HELLO_WORLD_SHA1);
        assert_eq!(content_hash(b""), EMPTY_SHA1);
    }

    #[test]
    fn test_file_content_hash() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"hello world").unwrap();

        assert_eq!(file_content_hash(&file_path).unwrap(), HELLO_WORLD_SHA1);
    }

    #[test]
    fn test_file_hash_matches_buffer_hash_past_buffer_size() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("large.bin");

        // Larger than one read buffer
        let data = vec![0xABu8; 100_000];
        std::fs::write(&file_path, &data).unwrap();

        assert_eq!(file_content_hash(&file_path).unwrap(), content_hash(&data));
    }

    #[test]
    fn test_file_content_hash_nonexistent() {
        let result = file_content_hash(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(SyncError::ReadFailed { .. })));
    }

    #[test]
    fn test_hashes_match_ignores_case() {
        assert!(hashes_match(
            "2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED",
            HELLO_WORLD_SHA1
        ));
        assert!(!hashes_match(EMPTY_SHA1, HELLO_WORLD_SHA1));
    }

    #[test]
    fn test_verify_bytes_mismatch() {
        let result = verify_bytes("mymod.zip", b"hello world", "wrong");

        match result {
            Err(SyncError::ChecksumMismatch {
                filename, actual, ..
            }) => {
                assert_eq!(filename, "mymod.zip");
                assert_eq!(actual, HELLO_WORLD_SHA1);
            }
            _ => panic!("Expected ChecksumMismatch error"),
        }
    }

    #[test]
    fn test_verify_bytes_match() {
        let actual = verify_bytes("mymod.zip", b"hello world", HELLO_WORLD_SHA1).unwrap();
        assert_eq!(actual, HELLO_WORLD_SHA1);
    }
}
