//! Skips rewriting output files whose bytes have not changed since the last
//! emission. Keyed by output path, compared by SHA-256 digest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::trace;

use super::files::write_file;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct OutputCache {
    digests: HashMap<PathBuf, String>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Write `bytes` to `path` unless the same bytes were already written
    /// there and the file still exists. Returns whether a write happened.
    pub fn write(&mut self, path: &Path, bytes: &[u8]) -> Result<bool> {
        let digest = Self::compute_hash(bytes);
        if path.is_file() && self.digests.get(path) == Some(&digest) {
            trace!(path = %path.display(), "unchanged, skipped");
            return Ok(false);
        }

        write_file(path, bytes)?;
        self.digests.insert(path.to_path_buf(), digest);
        Ok(true)
    }

    pub fn forget(&mut self, path: &Path) {
        self.digests.remove(path);
    }

    /// Drop every entry under `dir`, used after the directory is cleaned.
    pub fn forget_under(&mut self, dir: &Path) {
        self.digests.retain(|p, _| !p.starts_with(dir));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn identical_bytes_are_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/a.js");
        let mut cache = OutputCache::new();

        assert!(cache.write(&path, b"one").unwrap());
        assert!(!cache.write(&path, b"one").unwrap());
        assert!(cache.write(&path, b"two").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[test]
    fn deleted_outputs_are_written_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.css");
        let mut cache = OutputCache::new();

        cache.write(&path, b"x").unwrap();
        fs::remove_file(&path).unwrap();
        assert!(cache.write(&path, b"x").unwrap());
        assert!(path.is_file());
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            OutputCache::compute_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
