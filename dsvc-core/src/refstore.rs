// src/refstore.rs
//! Name → head pointers.
//!
//! One entry per `username/name`, holding the profile that owns it and the
//! content address of its current head. Persisted as pretty JSON and rewritten
//! atomically on every change. Last write wins.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::dsref::Ref;
use crate::error::{RepoError, Result};
use crate::utils::fsio::write_atomic;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RefFile {
    #[serde(default)]
    refs: Vec<Ref>,
}

#[derive(Debug)]
pub struct RefStore {
    file: Option<PathBuf>,
    refs: Mutex<Vec<Ref>>,
}

impl RefStore {
    /// Load from `file`; a missing file is an empty store.
    pub fn open(file: impl Into<PathBuf>) -> Result<Self> {
        let file = file.into();
        let refs = if file.exists() {
            let bytes = fs::read(&file)?;
            serde_json::from_slice::<RefFile>(&bytes)?.refs
        } else {
            Vec::new()
        };
        Ok(Self {
            file: Some(file),
            refs: Mutex::new(refs),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            file: None,
            refs: Mutex::new(Vec::new()),
        }
    }

    fn with_refs<T>(&self, f: impl FnOnce(&mut Vec<Ref>) -> Result<T>) -> Result<T> {
        let mut refs = self
            .refs
            .lock()
            .map_err(|_| RepoError::Store("ref store lock poisoned".to_string()))?;
        f(&mut refs)
    }

    fn persist(&self, refs: &[Ref]) -> Result<()> {
        if let Some(file) = &self.file {
            let mut sorted = refs.to_vec();
            sorted.sort_by(|a, b| a.alias().cmp(&b.alias()));
            let bytes = serde_json::to_vec_pretty(&RefFile { refs: sorted })?;
            write_atomic(file, &bytes)?;
        }
        Ok(())
    }

    /// Point `username/name` at `r.path`, replacing any previous pointer.
    pub fn put_ref(&self, r: &Ref) -> Result<()> {
        if r.username.is_empty() || r.name.is_empty() || r.path.is_empty() {
            return Err(RepoError::Validation(format!(
                "ref store needs username, name and path, got \"{r}\""
            )));
        }
        self.with_refs(|refs| {
            refs.retain(|x| !(x.username == r.username && x.name == r.name));
            refs.push(r.clone());
            self.persist(refs)
        })
    }

    pub fn delete_ref(&self, username: &str, name: &str) -> Result<Ref> {
        self.with_refs(|refs| {
            let pos = refs
                .iter()
                .position(|x| x.username == username && x.name == name)
                .ok_or_else(|| RepoError::NotFound(format!("{username}/{name}")))?;
            let removed = refs.remove(pos);
            self.persist(refs)?;
            Ok(removed)
        })
    }

    pub fn get_ref(&self, username: &str, name: &str) -> Result<Option<Ref>> {
        self.with_refs(|refs| {
            Ok(refs
                .iter()
                .find(|x| x.username == username && x.name == name)
                .cloned())
        })
    }

    /// Fill in whatever `r` leaves out. A human-friendly ref gains its profile
    /// and head path; a path-only ref gains its name if some head points there.
    pub fn canonicalize(&self, r: &mut Ref) -> Result<()> {
        self.with_refs(|refs| {
            let found = if !r.name.is_empty() {
                refs.iter().find(|x| x.username == r.username && x.name == r.name)
            } else {
                refs.iter().find(|x| x.path == r.path)
            };
            let Some(found) = found else {
                if r.is_right_hand_side_only() {
                    return Ok(());
                }
                return Err(RepoError::NotFound(r.to_string()));
            };
            if r.username.is_empty() {
                r.username = found.username.clone();
                r.name = found.name.clone();
            }
            if r.profile_id.is_empty() {
                r.profile_id = found.profile_id.clone();
            }
            if r.path.is_empty() {
                r.path = found.path.clone();
            }
            Ok(())
        })
    }

    /// Every pointer, ordered by `username/name`.
    pub fn list(&self) -> Result<Vec<Ref>> {
        self.with_refs(|refs| {
            let mut out = refs.clone();
            out.sort_by(|a, b| a.alias().cmp(&b.alias()));
            Ok(out)
        })
    }
}
