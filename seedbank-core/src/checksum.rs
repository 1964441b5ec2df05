//! Per-file and package-level content digests.
//!
//! A package with a single file carries that file's checksum unchanged; a
//! package with several files carries the digest of the per-file checksums
//! concatenated in ascending file-name order. The ordering is fixed here so
//! the aggregate checksum is reproducible across runs.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Compute the lowercase hex SHA256 digest of a byte slice.
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the digest of a file on disk without loading it whole.
pub async fn digest_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Combine per-file checksums (already ordered by file name) into one
/// package checksum.
pub fn combine<S: AsRef<str>>(checksums: &[S]) -> String {
    if checksums.len() == 1 {
        return checksums[0].as_ref().to_string();
    }

    let joined: String = checksums.iter().map(|c| c.as_ref()).collect();
    digest(joined.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_hex_sha256() {
        let hash = digest(b"hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_combine_single_is_identity() {
        let checksums = vec!["aabbcc".to_string()];
        assert_eq!(combine(&checksums), "aabbcc");
    }

    #[test]
    fn test_combine_multiple_digests_concatenation() {
        let a = digest(b"first");
        let b = digest(b"second");
        let expected = digest(format!("{}{}", a, b).as_bytes());
        assert_eq!(combine(&[a, b]), expected);
    }

    #[tokio::test]
    async fn test_digest_file_matches_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        tokio::fs::write(&path, b"streamed content").await.unwrap();

        assert_eq!(digest_file(&path).await.unwrap(), digest(b"streamed content"));
    }
}
