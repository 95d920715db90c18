// tarstow-aio/src/checksum.rs
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};
use tarstow_common::error::Result;
use tracing::debug;

/// Hex SHA256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let bytes = io::copy(&mut reader, &mut hasher)?;
    let digest = hex::encode(hasher.finalize());
    debug!(
        "SHA256 of {}: {} ({} bytes read)",
        path.display(),
        digest,
        bytes
    );
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn hashes_known_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(sha256_file(&temp.path().join("missing")).is_err());
    }
}
