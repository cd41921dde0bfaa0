// src/logbook/mod.rs
//! Change log: the authoritative, append-only history of every dataset.
//!
//! Each dataset lineage is keyed by an InitID and holds one `init` op followed
//! by `version` ops. Removals are appended as `delete_versions` or
//! `delete_dataset` ops; nothing is ever rewritten in place.

mod book;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::dsref::Ref;
use crate::error::{RepoError, Result};

pub use book::Book;

/// One history entry as served to callers, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetLogItem {
    pub username: String,
    pub profile_id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub commit_title: String,
    #[serde(default)]
    pub commit_message: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub body_size: u64,
    pub body_rows: u64,
    pub num_errors: u64,
    /// The snapshot is not present in the local store.
    #[serde(default)]
    pub foreign: bool,
}

impl DatasetLogItem {
    pub fn to_ref(&self) -> Ref {
        Ref {
            username: self.username.clone(),
            profile_id: self.profile_id.clone(),
            name: self.name.clone(),
            path: self.path.clone(),
        }
    }

    /// Item for a snapshot found by walking content links.
    pub fn from_dataset(r: &Ref, ds: &Dataset) -> Self {
        Self {
            username: r.username.clone(),
            profile_id: r.profile_id.clone(),
            name: r.name.clone(),
            path: ds.path.clone(),
            commit_title: ds.commit.as_ref().map(|c| c.title.clone()).unwrap_or_default(),
            commit_message: ds.commit.as_ref().map(|c| c.message.clone()).unwrap_or_default(),
            timestamp: ds.commit.as_ref().map(|c| c.timestamp),
            body_size: ds.body_size(),
            body_rows: ds.body_rows(),
            num_errors: ds.num_errors(),
            foreign: false,
        }
    }
}

/// A version op as recorded. Commit title and message stay in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub path: String,
    #[serde(default)]
    pub prev: String,
    pub timestamp: DateTime<Utc>,
    pub body_size: u64,
    pub body_rows: u64,
    #[serde(default)]
    pub num_errors: u64,
}

impl VersionEntry {
    pub fn from_dataset(ds: &Dataset) -> Self {
        Self {
            path: ds.path.clone(),
            prev: ds.previous_path.clone(),
            timestamp: ds.commit.as_ref().map(|c| c.timestamp).unwrap_or_else(Utc::now),
            body_size: ds.body_size(),
            body_rows: ds.body_rows(),
            num_errors: ds.num_errors(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogOp {
    Init {
        username: String,
        profile_id: String,
        name: String,
    },
    Version(VersionEntry),
    DeleteVersions {
        count: usize,
    },
    DeleteDataset,
}

/// Replayed view of one live lineage, versions oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetLog {
    pub init_id: String,
    pub username: String,
    pub profile_id: String,
    pub name: String,
    pub versions: Vec<VersionEntry>,
}

impl DatasetLog {
    /// Index of the newest op. The init is 0 and each live version adds one.
    pub fn top_index(&self) -> usize {
        self.versions.len()
    }

    pub fn head(&self) -> Option<&VersionEntry> {
        self.versions.last()
    }
}

pub trait Logbook: Send + Sync {
    /// Fails with `NotFound` if `username/name` was never initialized.
    fn ref_to_init_id(&self, r: &Ref) -> Result<String>;

    /// Start a lineage. Callers check `ref_to_init_id` first.
    fn write_dataset_init(&self, username: &str, profile_id: &str, name: &str) -> Result<String>;

    /// `ds.path` must already be set to the snapshot's content address.
    fn write_version_save(&self, init_id: &str, ds: &Dataset) -> Result<()>;

    /// Drop the newest `count` versions.
    fn write_version_delete(&self, init_id: &str, count: usize) -> Result<()>;

    fn write_dataset_delete(&self, init_id: &str) -> Result<()>;

    /// Newest first. `NotFound` for unknown names, `NoHistory` for empty pages.
    fn items(&self, r: &Ref, offset: usize, limit: Option<usize>) -> Result<Vec<DatasetLogItem>>;

    /// Seed a log from snapshots found by walking history, given newest first.
    fn construct_dataset_log(&self, r: &Ref, history: &[Dataset]) -> Result<()>;

    /// Every live lineage, in creation order.
    fn dataset_logs(&self) -> Result<Vec<DatasetLog>>;

    fn has_entries(&self, r: &Ref) -> Result<bool> {
        match self.ref_to_init_id(r) {
            Ok(_) => Ok(true),
            Err(RepoError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Used when the logbook is disabled. History falls back to content links.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBook;

impl Logbook for NoBook {
    fn ref_to_init_id(&self, _r: &Ref) -> Result<String> {
        Err(RepoError::NoLogbook)
    }

    fn write_dataset_init(&self, _username: &str, _profile_id: &str, _name: &str) -> Result<String> {
        Err(RepoError::NoLogbook)
    }

    fn write_version_save(&self, _init_id: &str, _ds: &Dataset) -> Result<()> {
        Err(RepoError::NoLogbook)
    }

    fn write_version_delete(&self, _init_id: &str, _count: usize) -> Result<()> {
        Err(RepoError::NoLogbook)
    }

    fn write_dataset_delete(&self, _init_id: &str) -> Result<()> {
        Err(RepoError::NoLogbook)
    }

    fn items(&self, _r: &Ref, _offset: usize, _limit: Option<usize>) -> Result<Vec<DatasetLogItem>> {
        Err(RepoError::NoLogbook)
    }

    fn construct_dataset_log(&self, _r: &Ref, _history: &[Dataset]) -> Result<()> {
        Err(RepoError::NoLogbook)
    }

    fn dataset_logs(&self) -> Result<Vec<DatasetLog>> {
        Err(RepoError::NoLogbook)
    }

    fn has_entries(&self, _r: &Ref) -> Result<bool> {
        Err(RepoError::NoLogbook)
    }
}

/// `hex(blake3(profile_id || name || nonce))`, first 32 chars.
pub(crate) fn mint_init_id(profile_id: &str, name: &str) -> String {
    let nonce = uuid::Uuid::new_v4();
    let mut hasher = blake3::Hasher::new();
    hasher.update(profile_id.as_bytes());
    hasher.update(name.as_bytes());
    hasher.update(nonce.as_bytes());
    let mut id = hasher.finalize().to_hex().to_string();
    id.truncate(32);
    id
}
