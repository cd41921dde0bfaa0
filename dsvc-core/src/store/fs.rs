// src/store/fs.rs
//! Filesystem content store: blobs live under `<root>/<hash>`.

use std::fs;
use std::path::PathBuf;

use super::{content_path, split_path, ContentStore};
use crate::error::{RepoError, Result};
use crate::utils::fsio::write_atomic;

pub const FS_KIND: &str = "fs";

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    // Per-object size cap; dataset bodies beyond this need a different store.
    const MAX_OBJECT_BYTES: usize = 64 * 1024 * 1024;

    /// Create the store root if needed (idempotent).
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn blob_path(&self, path: &str) -> Result<PathBuf> {
        let (kind, hash) = split_path(path)?;
        if kind != FS_KIND {
            return Err(RepoError::Store(format!(
                "path \"{path}\" does not belong to the {FS_KIND} store"
            )));
        }
        Ok(self.root.join(hash))
    }
}

impl ContentStore for FsStore {
    fn kind(&self) -> &str {
        FS_KIND
    }

    fn has(&self, path: &str) -> Result<bool> {
        match split_path(path)? {
            (FS_KIND, _) => Ok(self.blob_path(path)?.exists()),
            _ => Ok(false),
        }
    }

    /// # Behavior
    /// - Reads `<root>/<hash>`; a missing file is `NotFound`.
    /// - Refuses objects larger than the per-object cap.
    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.blob_path(path)?;
        let meta = match fs::metadata(&file) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepoError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if meta.len() > Self::MAX_OBJECT_BYTES as u64 {
            return Err(RepoError::Store(format!(
                "object too large to read: {} bytes (max {})",
                meta.len(),
                Self::MAX_OBJECT_BYTES
            )));
        }
        Ok(fs::read(&file)?)
    }

    /// # Behavior
    /// - Computes the address from `bytes`.
    /// - Writes `<root>/<hash>` only if missing (idempotent).
    fn put(&self, bytes: &[u8]) -> Result<String> {
        if bytes.len() > Self::MAX_OBJECT_BYTES {
            return Err(RepoError::Store(format!(
                "object too large: {} bytes (max {})",
                bytes.len(),
                Self::MAX_OBJECT_BYTES
            )));
        }
        let path = content_path(FS_KIND, bytes);
        let file = self.blob_path(&path)?;
        if !file.exists() {
            write_atomic(&file, bytes)?;
        }
        tracing::trace!(path = %path, bytes = bytes.len(), "stored blob");
        Ok(path)
    }
}
