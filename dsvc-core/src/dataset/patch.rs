// src/dataset/patch.rs
//! Field-presence representation of a save request and the merge rules that
//! apply it over the previous snapshot.
//!
//! Merge rules, per component:
//! - `meta`: field-level; set fields overwrite, unset fields inherit.
//! - `structure`: overwrite; `schema`/`format_config` inherit when unset and the format is unchanged.
//!   Row counts and sizes are always recomputed from the body afterwards.
//! - `body`: a supplied body replaces `body_path` once written; otherwise it is inherited.
//! - `transform`, `readme`: overwrite when set, else inherit.
//! - `commit`, `previous_path`: never inherited; recomputed by the save.

use super::{Dataset, Meta, Readme, Structure, Transform};

/// Body bytes supplied with a save, with the filename they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl BodyFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Last path segment of `filename`.
    pub fn basename(&self) -> &str {
        self.filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(&self.filename)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitPatch {
    pub title: Option<String>,
    pub message: Option<String>,
}

/// Changes to apply in a save. `None` means "not changing".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetPatch {
    pub username: Option<String>,
    pub name: Option<String>,
    pub meta: Option<MetaPatch>,
    pub structure: Option<Structure>,
    pub body: Option<BodyFile>,
    pub commit: Option<CommitPatch>,
    pub transform: Option<Transform>,
    pub readme: Option<Readme>,
}

impl DatasetPatch {
    pub fn with_body(mut self, filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Some(BodyFile::new(filename, bytes));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn has_body_or_structure(&self) -> bool {
        self.body.is_some() || self.structure.is_some()
    }

    /// Components this patch sets. A transform may only touch these.
    pub fn changed_components(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.meta.is_some() {
            out.push("meta");
        }
        if self.structure.is_some() {
            out.push("structure");
        }
        if self.body.is_some() {
            out.push("body");
        }
        if self.readme.is_some() {
            out.push("readme");
        }
        if self.transform.is_some() {
            out.push("transform");
        }
        out
    }

    /// Apply this patch over `prev`.
    pub fn merge_onto(&self, prev: &Dataset) -> Dataset {
        Dataset {
            meta: merge_meta(prev.meta.as_ref(), self.meta.as_ref()),
            structure: merge_structure(prev.structure.as_ref(), self.structure.as_ref()),
            body_path: if self.body.is_some() {
                String::new()
            } else {
                prev.body_path.clone()
            },
            transform: self.transform.clone().or_else(|| prev.transform.clone()),
            readme: self.readme.clone().or_else(|| prev.readme.clone()),
            ..Default::default()
        }
    }

    /// Treat this patch as a complete snapshot; nothing is inherited.
    pub fn to_replacement(&self) -> Dataset {
        self.merge_onto(&Dataset::default())
    }
}

fn merge_meta(prev: Option<&Meta>, patch: Option<&MetaPatch>) -> Option<Meta> {
    let Some(patch) = patch else {
        return prev.cloned();
    };
    let mut meta = prev.cloned().unwrap_or_default();
    if let Some(t) = &patch.title {
        meta.title = Some(t.clone());
    }
    if let Some(d) = &patch.description {
        meta.description = Some(d.clone());
    }
    if let Some(k) = &patch.keywords {
        meta.keywords = k.clone();
    }
    Some(meta)
}

fn merge_structure(prev: Option<&Structure>, patch: Option<&Structure>) -> Option<Structure> {
    let Some(patch) = patch else {
        return prev.cloned();
    };
    let mut st = patch.clone();
    if let Some(prev) = prev.filter(|p| p.format == st.format) {
        if st.schema.is_none() {
            st.schema = prev.schema.clone();
        }
        if st.format_config.is_none() {
            st.format_config = prev.format_config.clone();
        }
    }
    Some(st)
}
