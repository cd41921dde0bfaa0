// src/dscache/mod.rs
//! Dscache: a denormalized listing of every dataset, derived from the logbook.
//!
//! - Answers "list" and "resolve name" without replaying the log.
//! - Always disposable: `rebuild(book)` from scratch must reproduce the same
//!   `refs` (apart from `cursor_index`) as incremental maintenance.
//! - `refs` are kept sorted by `pretty_name` on every write and read.
//! - Users are never pruned by removals; `compact_users` does that explicitly.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{RepoError, Result};
use crate::logbook::{DatasetLog, Logbook};
use crate::store::{load_dataset, ContentStore};
use crate::utils::fsio::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub profile_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefEntry {
    pub init_id: String,
    pub profile_id: String,
    /// Index of the newest op; the init is 0, so this is the version count.
    pub top_index: usize,
    /// Checked-out version. Equals `top_index` unless a working copy moved it.
    pub cursor_index: usize,
    pub pretty_name: String,
    pub body_size: u64,
    pub body_rows: u64,
    /// Unix seconds of the head commit.
    pub commit_time: i64,
    #[serde(default)]
    pub num_errors: u64,
    pub head_ref: String,
}

impl RefEntry {
    fn from_log(log: &DatasetLog) -> Option<Self> {
        let head = log.head()?;
        Some(Self {
            init_id: log.init_id.clone(),
            profile_id: log.profile_id.clone(),
            top_index: log.top_index(),
            cursor_index: log.top_index(),
            pretty_name: log.name.clone(),
            body_size: head.body_size,
            body_rows: head.body_rows,
            commit_time: head.timestamp.timestamp(),
            num_errors: head.num_errors,
            head_ref: head.path.clone(),
        })
    }

    fn take_head_stats(&mut self, ds: &Dataset) {
        self.body_size = ds.body_size();
        self.body_rows = ds.body_rows();
        self.commit_time = ds.commit_time();
        self.num_errors = ds.num_errors();
        self.head_ref = ds.path.clone();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dscache {
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub refs: Vec<RefEntry>,
    #[serde(skip)]
    file: Option<PathBuf>,
}

impl Dscache {
    /// Empty cache persisted at `file` on `save`.
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            users: Vec::new(),
            refs: Vec::new(),
            file,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Replay every live lineage in `book` into a fresh cache.
    pub fn rebuild(book: &dyn Logbook, file: Option<PathBuf>) -> Result<Self> {
        let mut cache = Self::new(file);
        for log in book.dataset_logs()? {
            let Some(entry) = RefEntry::from_log(&log) else {
                continue;
            };
            cache.ensure_user(&log.username, &log.profile_id);
            cache.refs.push(entry);
        }
        cache.sort();
        Ok(cache)
    }

    /// Read a cache file. `Ok(None)` when there is no file yet.
    pub fn load(file: impl Into<PathBuf>) -> Result<Option<Self>> {
        let file = file.into();
        if !file.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&file)?;
        let mut cache: Dscache = serde_json::from_slice(&bytes)?;
        cache.file = Some(file);
        cache.sort();
        Ok(Some(cache))
    }

    /// Persist to this cache's file; a no-op for unbacked caches.
    pub fn save(&mut self) -> Result<()> {
        self.sort();
        let Some(file) = &self.file else {
            return Ok(());
        };
        write_atomic(file, &serde_json::to_vec_pretty(self)?)
    }

    fn sort(&mut self) {
        self.refs.sort_by(|a, b| a.pretty_name.cmp(&b.pretty_name));
    }

    /// One row per profile; a new peername replaces the old one.
    fn ensure_user(&mut self, username: &str, profile_id: &str) {
        match self.users.iter_mut().find(|u| u.profile_id == profile_id) {
            Some(user) if user.username != username => user.username = username.to_string(),
            Some(_) => {}
            None => self.users.push(UserEntry {
                username: username.to_string(),
                profile_id: profile_id.to_string(),
            }),
        }
    }

    /// Advance (or create) the entry for `init_id` to the saved snapshot.
    /// Applying the same head twice is a no-op.
    ///
    /// An `init_id` the cache has never seen means the logbook gained a
    /// lineage behind the cache's back (a history backfill, say), so the
    /// cache is rebuilt from `book` before merging.
    pub fn merge_save(
        &mut self,
        book: &dyn Logbook,
        init_id: &str,
        username: &str,
        profile_id: &str,
        name: &str,
        ds: &Dataset,
    ) -> Result<()> {
        if !self.refs.iter().any(|r| r.init_id == init_id) {
            let users = std::mem::take(&mut self.users);
            *self = Self::rebuild(book, self.file.take())?;
            for u in users {
                if !self.users.iter().any(|have| have.profile_id == u.profile_id) {
                    self.users.push(u);
                }
            }
        }
        self.ensure_user(username, profile_id);
        match self.refs.iter_mut().find(|r| r.init_id == init_id) {
            Some(entry) if entry.head_ref == ds.path => {}
            Some(entry) => {
                entry.top_index += 1;
                entry.cursor_index = entry.top_index;
                entry.pretty_name = name.to_string();
                entry.take_head_stats(ds);
            }
            None => {
                let mut entry = RefEntry {
                    init_id: init_id.to_string(),
                    profile_id: profile_id.to_string(),
                    top_index: 1,
                    cursor_index: 1,
                    pretty_name: name.to_string(),
                    ..Default::default()
                };
                entry.take_head_stats(ds);
                self.refs.push(entry);
            }
        }
        self.sort();
        Ok(())
    }

    /// Keep only the oldest `keep_count` versions of `init_id`, stepping back
    /// along `previous_path` from the head. `keep_count == 0` drops the entry.
    pub fn remove_versions(&mut self, store: &dyn ContentStore, init_id: &str, keep_count: usize) -> Result<()> {
        let pos = self
            .refs
            .iter()
            .position(|r| r.init_id == init_id)
            .ok_or_else(|| RepoError::NotFound(format!("dscache: initID {init_id}")))?;
        if keep_count == 0 {
            self.refs.remove(pos);
            return Ok(());
        }
        let entry = &mut self.refs[pos];
        if keep_count >= entry.top_index {
            return Ok(());
        }
        let mut ds = load_dataset(store, &entry.head_ref)?;
        for _ in 0..entry.top_index - keep_count {
            if ds.previous_path.is_empty() {
                return Err(RepoError::NoHistory);
            }
            ds = load_dataset(store, &ds.previous_path)?;
        }
        entry.top_index = keep_count;
        entry.cursor_index = keep_count;
        entry.take_head_stats(&ds);
        Ok(())
    }

    /// Drop users that no entry refers to. Returns how many were removed.
    pub fn compact_users(&mut self) -> usize {
        let before = self.users.len();
        let refs = &self.refs;
        self.users.retain(|u| refs.iter().any(|r| r.profile_id == u.profile_id));
        before - self.users.len()
    }

    pub fn lookup_by_name(&self, username: &str, name: &str) -> Option<&RefEntry> {
        let users: Vec<&str> = self
            .users
            .iter()
            .filter(|u| u.username == username)
            .map(|u| u.profile_id.as_str())
            .collect();
        self.refs
            .iter()
            .find(|r| r.pretty_name == name && users.contains(&r.profile_id.as_str()))
    }

    pub fn username_for(&self, profile_id: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.profile_id == profile_id)
            .map(|u| u.username.as_str())
    }

    /// A page of entries in pretty-name order.
    pub fn list(&self, offset: usize, limit: Option<usize>) -> Vec<RefEntry> {
        self.refs
            .iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Debug dump. `numErrors` appears only when non-zero unless `show_empty`.
    pub fn verbose_string(&self, show_empty: bool) -> String {
        let mut out = String::from("Dscache:\n Dscache.Users:\n");
        for (i, u) in self.users.iter().enumerate() {
            let _ = writeln!(out, "  {}) user={} profileID={}", i, u.username, u.profile_id);
        }
        out.push_str(" Dscache.Refs:\n");
        for (i, r) in self.refs.iter().enumerate() {
            let _ = writeln!(out, "  {}) {:<14}= {}", i, "initID", r.init_id);
            let mut field = |k: &str, v: &dyn std::fmt::Display| {
                let _ = writeln!(out, "     {:<14}= {}", k, v);
            };
            field("profileID", &r.profile_id);
            field("topIndex", &r.top_index);
            field("cursorIndex", &r.cursor_index);
            field("prettyName", &r.pretty_name);
            field("bodySize", &r.body_size);
            field("bodyRows", &r.body_rows);
            field("commitTime", &r.commit_time);
            if show_empty || r.num_errors != 0 {
                field("numErrors", &r.num_errors);
            }
            field("headRef", &r.head_ref);
        }
        out
    }
}
