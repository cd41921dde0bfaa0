// src/store/mem.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{content_path, ContentStore};
use crate::error::{RepoError, Result};

pub const MEM_KIND: &str = "mem";

/// Process-local store. With a fallback it becomes a write overlay: reads that
/// miss locally go to the fallback, writes never do. Dry runs save into one.
#[derive(Default)]
pub struct MemStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fallback: Option<Arc<dyn ContentStore>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overlay(fallback: Arc<dyn ContentStore>) -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            fallback: Some(fallback),
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn local(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| RepoError::Store("mem store lock poisoned".to_string()))?;
        Ok(blobs.get(path).cloned())
    }
}

impl ContentStore for MemStore {
    fn kind(&self) -> &str {
        MEM_KIND
    }

    fn has(&self, path: &str) -> Result<bool> {
        if self.local(path)?.is_some() {
            return Ok(true);
        }
        match &self.fallback {
            Some(f) => f.has(path),
            None => Ok(false),
        }
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        if let Some(bytes) = self.local(path)? {
            return Ok(bytes);
        }
        match &self.fallback {
            Some(f) => f.get(path),
            None => Err(RepoError::NotFound(path.to_string())),
        }
    }

    fn put(&self, bytes: &[u8]) -> Result<String> {
        let path = content_path(MEM_KIND, bytes);
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| RepoError::Store("mem store lock poisoned".to_string()))?;
        blobs.entry(path.clone()).or_insert_with(|| bytes.to_vec());
        Ok(path)
    }
}
