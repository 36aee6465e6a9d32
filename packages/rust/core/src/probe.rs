//! Installer digests and size, as referenced by the prefetch statement.

use std::path::Path;

use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::debug;

use besengine_shared::{BesEngineError, Result};

/// Content digests and byte length of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex SHA-1.
    pub sha1: String,
    /// Lowercase hex SHA-256.
    pub sha256: String,
    pub size_bytes: u64,
}

/// Read `path` fully and compute its SHA-1, SHA-256 and size.
pub fn probe(path: &Path) -> Result<FileDigest> {
    let bytes = std::fs::read(path).map_err(|e| BesEngineError::io(path, e))?;

    let sha1 = format!("{:x}", Sha1::digest(&bytes));
    let sha256 = format!("{:x}", Sha256::digest(&bytes));
    let size_bytes = bytes.len() as u64;

    debug!(path = %path.display(), size_bytes, %sha1, "probed file");

    Ok(FileDigest {
        sha1,
        sha256,
        size_bytes,
    })
}

/// Size of `path` in bytes, from filesystem metadata.
pub fn file_size(path: &Path) -> Result<u64> {
    let meta = std::fs::metadata(path).map_err(|e| BesEngineError::io(path, e))?;
    Ok(meta.len())
}

/// Render a prefetch statement for the target agent.
pub fn prefetch_statement(file_name: &str, digest: &FileDigest, url: &str) -> String {
    format!(
        "prefetch {file_name} sha1:{} size:{} {url} sha256:{}",
        digest.sha1, digest.size_bytes, digest.sha256
    )
}
