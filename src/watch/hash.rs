// src/watch/hash.rs

//! Content hashing used to drop no-op `modified` events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;

/// Compute the blake3 hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let bytes = fs
        .read(path)
        .with_context(|| format!("reading file for hashing: {:?}", path))?;
    let mut hasher = Hasher::new();
    hasher.update(&bytes);
    Ok(hasher.finalize().to_hex().to_string())
}

/// In-memory cache of file hashes, keyed by absolute path.
///
/// Only the file that changed is re-hashed on each event.
#[derive(Debug, Default)]
pub struct FileCache {
    hashes: HashMap<PathBuf, String>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Record the current hash of `path` without reporting anything.
    pub fn seed(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        let hash = compute_file_hash(fs, path)?;
        self.hashes.insert(path.to_path_buf(), hash);
        Ok(())
    }

    /// Re-hash `path` and report whether its contents are identical to the
    /// last recorded hash. Unknown and unreadable files count as changed.
    pub fn is_unchanged(&mut self, fs: &dyn FileSystem, path: &Path) -> bool {
        let hash = match compute_file_hash(fs, path) {
            Ok(hash) => hash,
            Err(err) => {
                debug!(path = ?path, error = %err, "could not hash file; treating as changed");
                self.hashes.remove(path);
                return false;
            }
        };

        match self.hashes.insert(path.to_path_buf(), hash.clone()) {
            Some(previous) if previous == hash => {
                debug!(path = ?path, "contents unchanged");
                true
            }
            _ => false,
        }
    }

    /// Forget a file (e.g. on deletion).
    pub fn invalidate(&mut self, path: &Path) {
        if self.hashes.remove(path).is_some() {
            debug!("invalidated cache for {:?}", path);
        }
    }
}
