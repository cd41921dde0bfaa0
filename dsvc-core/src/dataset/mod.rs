// src/dataset/mod.rs
//! Dataset snapshots.
//!
//! A snapshot is immutable once written to the content store. Identity fields
//! (`name`, `username`, `profile_id`, `path`) describe where a snapshot was
//! found and are never part of its content address.

pub mod body;
mod patch;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RepoError, Result};

pub use body::BodyFormat;
pub use patch::{BodyFile, CommitPatch, DatasetPatch, MetaPatch};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(default)]
    pub header_row: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_config: Option<FormatConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Number of rows in the body.
    #[serde(default)]
    pub entries: u64,
    /// Body size in bytes.
    #[serde(default)]
    pub length: u64,
    /// Rows that do not conform to `schema`.
    #[serde(default)]
    pub err_count: u64,
}

impl Structure {
    pub fn body_format(&self) -> Result<BodyFormat> {
        self.format.parse()
    }

    pub fn header_row(&self) -> bool {
        self.format_config.as_ref().map(|c| c.header_row).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub syntax: String,
    pub script: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Readme {
    pub text: String,
}

/// One version of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(skip)]
    pub username: String,
    #[serde(skip)]
    pub profile_id: String,
    #[serde(skip)]
    pub name: String,
    /// Content address this snapshot was loaded from.
    #[serde(skip)]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Commit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<Structure>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<Readme>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub previous_path: String,
}

#[derive(Serialize)]
struct Fingerprinted<'a> {
    meta: &'a Option<Meta>,
    structure: &'a Option<Structure>,
    body_path: &'a str,
    transform: &'a Option<Transform>,
    readme: &'a Option<Readme>,
}

impl Dataset {
    /// Canonical bytes used for content addressing.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Hash over everything a user can change. Commit and lineage are left out
    /// so re-saving identical content is recognisable as a no-op.
    pub fn fingerprint(&self) -> Result<String> {
        let view = Fingerprinted {
            meta: &self.meta,
            structure: &self.structure,
            body_path: &self.body_path,
            transform: &self.transform,
            readme: &self.readme,
        };
        let bytes = serde_json::to_vec(&view)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    pub fn commit_time(&self) -> i64 {
        self.commit.as_ref().map(|c| c.timestamp.timestamp()).unwrap_or(0)
    }

    pub fn body_size(&self) -> u64 {
        self.structure.as_ref().map(|s| s.length).unwrap_or(0)
    }

    pub fn body_rows(&self) -> u64 {
        self.structure.as_ref().map(|s| s.entries).unwrap_or(0)
    }

    pub fn num_errors(&self) -> u64 {
        self.structure.as_ref().map(|s| s.err_count).unwrap_or(0)
    }

    /// Strip everything but the content-address links (`body_path`, `previous_path`).
    pub fn refs_only(&self) -> Dataset {
        Dataset {
            username: self.username.clone(),
            profile_id: self.profile_id.clone(),
            name: self.name.clone(),
            path: self.path.clone(),
            body_path: self.body_path.clone(),
            previous_path: self.previous_path.clone(),
            commit: self.commit.clone(),
            ..Default::default()
        }
    }
}

/// Components a save may omit from the new snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentMask {
    pub meta: bool,
    pub structure: bool,
    pub body: bool,
    pub transform: bool,
    pub readme: bool,
}

impl ComponentMask {
    /// Parse a comma-separated list such as `"meta,transform"`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut mask = ComponentMask::default();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part {
                "meta" | "md" => mask.meta = true,
                "structure" | "st" => mask.structure = true,
                "body" | "bd" => mask.body = true,
                "transform" | "tf" => mask.transform = true,
                "readme" | "rm" => mask.readme = true,
                other => {
                    return Err(RepoError::Validation(format!("cannot drop unknown component \"{other}\"")));
                }
            }
        }
        Ok(mask)
    }

    pub fn is_empty(&self) -> bool {
        *self == ComponentMask::default()
    }

    pub fn apply(&self, ds: &mut Dataset) {
        if self.meta {
            ds.meta = None;
        }
        if self.structure {
            ds.structure = None;
        }
        if self.body {
            ds.body_path.clear();
        }
        if self.transform {
            ds.transform = None;
        }
        if self.readme {
            ds.readme = None;
        }
    }
}
