// src/store/mod.rs
//! Content-addressed blob storage.
//!
//! Paths look like `/<kind>/<base58(blake3(bytes))>`. Identical bytes always map
//! to the identical path, so writes are idempotent and concurrent duplicates
//! are harmless.

mod fs;
mod mem;

use std::io::{Cursor, Read};

use crate::dataset::Dataset;
use crate::error::{RepoError, Result};

pub use fs::{FsStore, FS_KIND};
pub use mem::{MemStore, MEM_KIND};

pub trait ContentStore: Send + Sync {
    /// Path prefix tag, e.g. `fs`.
    fn kind(&self) -> &str;

    fn has(&self, path: &str) -> Result<bool>;

    /// Fails with `NotFound` for unknown paths.
    fn get(&self, path: &str) -> Result<Vec<u8>>;

    fn put(&self, bytes: &[u8]) -> Result<String>;

    /// Stream a blob. The default buffers the whole blob.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.get(path)?)))
    }
}

pub fn content_path(kind: &str, bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes);
    format!("/{}/{}", kind, bs58::encode(hash.as_bytes()).into_string())
}

/// Split `/<kind>/<hash>` into its parts.
pub fn split_path(path: &str) -> Result<(&str, &str)> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| RepoError::Store(format!("malformed content path \"{path}\"")))?;
    match rest.split_once('/') {
        Some((kind, hash)) if !kind.is_empty() && !hash.is_empty() && !hash.contains('/') => Ok((kind, hash)),
        _ => Err(RepoError::Store(format!("malformed content path \"{path}\""))),
    }
}

/// Load a full snapshot and stamp it with the path it came from.
pub fn load_dataset(store: &dyn ContentStore, path: &str) -> Result<Dataset> {
    let bytes = store.get(path)?;
    let mut ds = Dataset::from_bytes(&bytes)?;
    ds.path = path.to_string();
    Ok(ds)
}

/// Header-only load: links and commit, no components.
pub fn load_dataset_refs(store: &dyn ContentStore, path: &str) -> Result<Dataset> {
    Ok(load_dataset(store, path)?.refs_only())
}

/// Write a snapshot, returning its content address.
pub fn put_dataset(store: &dyn ContentStore, ds: &Dataset) -> Result<String> {
    store.put(&ds.to_bytes()?)
}
