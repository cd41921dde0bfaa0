// src/dsref/mod.rs
//! Dataset references.
//!
//! Text form, left to right: `[username "/" name] ["@" [profileID] ["/" store "/" hash]]`.
//! Either half may be omitted but not both. `profileID` and `hash` are base58;
//! `store` is a lowercase tag such as `fs` or `mem`.

mod parse;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use parse::{is_valid_name, parse, parse_human_friendly, ParseError};

/// A reference to a dataset, optionally pinned to one version (`path`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub name: String,
    /// Content address (`/<store>/<hash>`), empty for "head".
    #[serde(default)]
    pub path: String,
}

impl Ref {
    pub fn new(username: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.name.is_empty() && self.profile_id.is_empty() && self.path.is_empty()
    }

    /// Only the `@…` half is present.
    pub fn is_right_hand_side_only(&self) -> bool {
        self.username.is_empty() && self.name.is_empty() && !self.path.is_empty()
    }

    /// Plain `username/name` with no version information.
    pub fn is_human_friendly(&self) -> bool {
        self.profile_id.is_empty() && self.path.is_empty()
    }

    /// `username/name` without the version suffix.
    pub fn alias(&self) -> String {
        format!("{}/{}", self.username, self.name)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.username.is_empty() || !self.name.is_empty() {
            write!(f, "{}/{}", self.username, self.name)?;
        }
        if !self.profile_id.is_empty() || !self.path.is_empty() {
            write!(f, "@{}{}", self.profile_id, self.path)?;
        }
        Ok(())
    }
}
