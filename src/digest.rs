//! Content hashing for drift detection
//!
//! The manifest records a SHA-256 digest for every installed artifact;
//! comparing a file's recomputed digest against the recorded one detects
//! local corruption independent of version tokens.

use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 of a byte buffer, as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a file's contents, as lowercase hex
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be read.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let data = tokio::fs::read(path).await?;
    Ok(sha256_hex(&data))
}
