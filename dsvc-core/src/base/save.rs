// src/base/save.rs
//! The write path: turn a `DatasetPatch` into a new content-addressed version.
//!
//! Naming, merging, transform and validation all run before anything is
//! written. Persisting starts with the content store; a failure after that
//! leaves only unreferenced blobs behind.

use std::io::{Read, Write};
use std::sync::Arc;

use chrono::Utc;

use super::name::{generate_available_name, infer_name};
use crate::dataset::body::{self, BodyFormat};
use crate::dataset::{BodyFile, Commit, ComponentMask, Dataset, DatasetPatch, Structure};
use crate::dsref::{self, ParseError, Ref};
use crate::error::{RepoError, Result};
use crate::repo::{Repo, ME};
use crate::store::{load_dataset, put_dataset, ContentStore, MemStore};
use crate::transform::{MutateCheck, Secrets};

#[derive(Debug, Clone, Default)]
pub struct SaveSwitches {
    /// Write into a throwaway store; leave refs, logbook and dscache alone.
    pub dry_run: bool,
    /// Create a new dataset, inventing a free name if the inferred one is taken.
    pub new_name: bool,
    /// Treat the patch as a complete snapshot instead of inheriting from the head.
    pub replace: bool,
    /// Transcode the body to the previous version's format instead of refusing.
    pub convert_format_to_prev: bool,
    /// Components to omit from the new version.
    pub drop: ComponentMask,
    /// Build the dscache from the logbook if it does not exist yet.
    pub use_dscache: bool,
}

pub struct SavedDataset {
    pub reference: Ref,
    pub dataset: Dataset,
    body: Option<Box<dyn Read + Send>>,
}

impl SavedDataset {
    /// Body of the new version, re-opened from the store it was written to.
    pub fn body(&mut self) -> Option<&mut (dyn Read + Send + 'static)> {
        self.body.as_deref_mut()
    }

    pub fn take_body(&mut self) -> Option<Box<dyn Read + Send>> {
        self.body.take()
    }

    pub fn read_body(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(body) = self.body.as_mut() else {
            return Ok(None);
        };
        let mut out = Vec::new();
        body.read_to_end(&mut out)?;
        Ok(Some(out))
    }
}

impl std::fmt::Debug for SavedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedDataset")
            .field("reference", &self.reference)
            .field("dataset", &self.dataset)
            .field("body", &self.body.is_some())
            .finish()
    }
}

struct Target {
    username: String,
    name: String,
    inferred: bool,
}

/// Save `changes` as the next version of a dataset.
///
/// # Arguments
/// * `changes`   : components to set; unset ones inherit from the head.
/// * `secrets`   : passed through to the transform runner.
/// * `sw`        : see `SaveSwitches`.
/// * `script_out`: receives transform output.
///
/// # Returns
/// * `Ok(SavedDataset)`: the new ref, its snapshot, and a readable body.
pub fn save(
    repo: &Repo,
    changes: DatasetPatch,
    secrets: &Secrets,
    sw: &SaveSwitches,
    script_out: &mut dyn Write,
) -> Result<SavedDataset> {
    let span = repo.diag().span().clone();
    let profile = repo.profile().clone();
    let mut changes = changes;

    // 1. identity and name
    let mut target = resolve_target(&profile.peername, &changes)?;
    tracing::debug!(parent: &span, dataset = %format!("{}/{}", target.username, target.name), inferred = target.inferred, "save");

    // 2. previous head
    let mut prev = load_head(repo, &target.username, &target.name)?;

    // 3. collisions
    if prev.is_some() {
        match (sw.new_name, target.inferred) {
            (true, true) => {
                let username = target.username.clone();
                target.name = generate_available_name(&target.name, |n| {
                    Ok(repo.refs().get_ref(&username, n)?.is_some())
                })?;
                tracing::debug!(parent: &span, name = %target.name, "generated available name");
                prev = load_head(repo, &target.username, &target.name)?;
            }
            (true, false) => return Err(RepoError::NameCollision(target.name)),
            (false, true) => return Err(RepoError::AmbiguousName(target.name)),
            (false, false) => {}
        }
    }

    // 4. name rules; upper case is tolerated only for names that already exist
    check_name(&target, prev.is_some())?;

    // 5. body format against the previous version
    let prev_structure = prev.as_ref().and_then(|p| p.structure.clone());
    if let Some(body) = changes.body.take() {
        let body = reconcile_format(&mut changes, body, prev_structure.as_ref(), sw.convert_format_to_prev)?;
        changes.body = Some(body);
    }

    // 8. something to build from
    if prev.is_none() && !changes.has_body_or_structure() {
        return Err(RepoError::RequiresStructureOrBody);
    }

    // 6. merge
    let base = prev.clone().unwrap_or_default();
    let mut next = if sw.replace {
        changes.to_replacement()
    } else {
        changes.merge_onto(&base)
    };
    if let Some(body) = &changes.body {
        next.structure = Some(describe_body(next.structure.take(), body)?);
    } else if changes.structure.is_some() && !next.body_path.is_empty() {
        let bytes = repo.store().get(&next.body_path)?;
        if let Some(st) = next.structure.as_mut() {
            body::describe(st, &bytes)?;
        }
    }

    // 7. transform
    let has_script = next.transform.as_ref().is_some_and(|t| !t.script.is_empty());
    if changes.transform.is_some() && has_script {
        let runner = repo
            .transformer()
            .ok_or_else(|| RepoError::Unsupported("no transform runner configured".to_string()))?;
        let check = MutateCheck::new(changes.changed_components());
        runner
            .exec(&mut next, prev.as_ref(), &check, secrets, script_out)
            .map_err(|e| RepoError::Transform(format!("{e:#}")))?;
        tracing::debug!(parent: &span, "transform complete");
    }

    sw.drop.apply(&mut next);
    if sw.drop.body {
        changes.body = None;
    }

    // 9. validate
    validate(&next, changes.body.is_some())?;

    let store: Arc<dyn ContentStore> = if sw.dry_run {
        Arc::new(MemStore::overlay(Arc::clone(repo.store())))
    } else {
        Arc::clone(repo.store())
    };

    // 12. no-op detection, before anything is written
    if let Some(body) = &changes.body {
        next.body_path = match prev.as_ref().filter(|p| !p.body_path.is_empty()) {
            Some(p) if same_bytes(store.as_ref(), &p.body_path, &body.bytes) => p.body_path.clone(),
            _ => String::new(),
        };
    }
    if let Some(prev) = &prev {
        if next.fingerprint()? == prev.fingerprint()? {
            return Err(RepoError::NoChanges);
        }
    }

    // 10. persist
    if let Some(body) = &changes.body {
        if next.body_path.is_empty() {
            next.body_path = store.put(&body.bytes)?;
        }
    }
    next.previous_path = prev.as_ref().map(|p| p.path.clone()).unwrap_or_default();
    next.commit = Some(Commit {
        title: commit_title(&changes, prev.as_ref(), &next),
        message: changes
            .commit
            .as_ref()
            .and_then(|c| c.message.clone())
            .unwrap_or_default(),
        timestamp: Utc::now(),
    });
    let path = put_dataset(store.as_ref(), &next)?;
    next.path = path.clone();
    next.username = target.username.clone();
    next.name = target.name.clone();
    next.profile_id = profile.id.clone();

    let reference = Ref {
        username: target.username.clone(),
        profile_id: profile.id.clone(),
        name: target.name.clone(),
        path: path.clone(),
    };

    // 11. refs, logbook, dscache
    if sw.dry_run {
        tracing::debug!(parent: &span, %path, "dry run, skipping ref and log updates");
    } else {
        record(repo, &reference, &next, sw.use_dscache)?;
    }

    // 13. re-open the body from the store it landed in
    let body = if next.body_path.is_empty() {
        None
    } else {
        Some(store.open(&next.body_path)?)
    };
    let mut dataset = load_dataset(store.as_ref(), &path)?;
    dataset.username = reference.username.clone();
    dataset.name = reference.name.clone();
    dataset.profile_id = reference.profile_id.clone();

    tracing::info!(parent: &span, dataset = %reference, "saved");
    Ok(SavedDataset {
        reference,
        dataset,
        body,
    })
}

fn resolve_target(peername: &str, changes: &DatasetPatch) -> Result<Target> {
    let mut username = changes.username.clone().unwrap_or_default();
    let mut name = changes.name.clone().unwrap_or_default();

    // A "user/name" string in the name slot.
    if name.contains('/') || name.contains('@') {
        let parsed = match dsref::parse_human_friendly(&name) {
            Ok(r) => r,
            Err(ParseError::BadCase(r)) => r,
            Err(e) => return Err(e.into()),
        };
        username = parsed.username;
        name = parsed.name;
    }

    if username.is_empty() || username == ME {
        username = peername.to_string();
    }
    if username != peername {
        return Err(RepoError::ForeignUsername(peername.to_string()));
    }

    if !name.is_empty() {
        return Ok(Target {
            username,
            name,
            inferred: false,
        });
    }
    match &changes.body {
        Some(body) => Ok(Target {
            username,
            name: infer_name(body.basename()),
            inferred: true,
        }),
        None => Err(RepoError::Validation(
            "cannot save without a dataset name or a body file to name it after".to_string(),
        )),
    }
}

fn check_name(target: &Target, exists: bool) -> Result<()> {
    let text = format!("{}/{}", target.username, target.name);
    match dsref::parse_human_friendly(&text) {
        Ok(_) => Ok(()),
        Err(ParseError::BadCase(_)) if exists => Ok(()),
        Err(ParseError::BadCase(_)) => Err(RepoError::BadCaseName(target.name.clone())),
        Err(e) => Err(RepoError::Validation(format!("invalid dataset name \"{}\": {}", target.name, e))),
    }
}

fn load_head(repo: &Repo, username: &str, name: &str) -> Result<Option<Dataset>> {
    match repo.refs().get_ref(username, name)? {
        Some(r) => Ok(Some(load_dataset(repo.store().as_ref(), &r.path)?)),
        None => Ok(None),
    }
}

/// Settle the body's format, converting to the previous format if asked.
fn reconcile_format(
    changes: &mut DatasetPatch,
    body: BodyFile,
    prev: Option<&Structure>,
    convert: bool,
) -> Result<BodyFile> {
    let declared = match changes.structure.as_ref().filter(|s| !s.format.is_empty()) {
        Some(st) => st.body_format()?,
        None => match BodyFormat::from_filename(&body.filename) {
            Some(f) => f,
            None => prev.filter(|p| !p.format.is_empty()).map(Structure::body_format).transpose()?.ok_or_else(|| {
                RepoError::Validation(format!("cannot determine body format of \"{}\"", body.filename))
            })?,
        },
    };
    let Some(prev) = prev.filter(|p| !p.format.is_empty()) else {
        set_format(changes, declared);
        return Ok(body);
    };
    if prev.format == declared.as_str() {
        set_format(changes, declared);
        return Ok(body);
    }
    if !convert {
        return Err(RepoError::StructureMismatch {
            prev: prev.format.clone(),
            next: declared.as_str().to_string(),
        });
    }
    let from = match changes.structure.clone() {
        Some(mut st) => {
            st.format = declared.as_str().to_string();
            st
        }
        None => body::infer_structure(declared, &body.bytes)?,
    };
    let bytes = body::convert(&body.bytes, &from, prev)?;
    let target = prev.body_format()?;
    set_format(changes, target);
    if let Some(st) = changes.structure.as_mut() {
        st.schema = prev.schema.clone();
        st.format_config = prev.format_config.clone();
    }
    let filename = match body.filename.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{target}"),
        None => format!("{}.{target}", body.filename),
    };
    Ok(BodyFile::new(filename, bytes))
}

fn set_format(changes: &mut DatasetPatch, format: BodyFormat) {
    match changes.structure.as_mut() {
        Some(st) => st.format = format.as_str().to_string(),
        None => {
            changes.structure = Some(Structure {
                format: format.as_str().to_string(),
                ..Default::default()
            })
        }
    }
}

/// Fill in what the caller left out of the structure, then count rows.
fn describe_body(st: Option<Structure>, body: &BodyFile) -> Result<Structure> {
    let mut st = st.unwrap_or_default();
    let format = if st.format.is_empty() {
        BodyFormat::from_filename(&body.filename)
            .ok_or_else(|| RepoError::Validation(format!("cannot determine body format of \"{}\"", body.filename)))?
    } else {
        st.body_format()?
    };
    // Infer whatever the merge left unset.
    if st.schema.is_none() || (st.format_config.is_none() && format == BodyFormat::Csv) {
        let inferred = body::infer_structure(format, &body.bytes)?;
        if st.schema.is_none() {
            st.schema = inferred.schema;
        }
        if st.format_config.is_none() {
            st.format_config = inferred.format_config;
        }
    }
    st.format = format.as_str().to_string();
    body::describe(&mut st, &body.bytes)?;
    Ok(st)
}

fn validate(ds: &Dataset, has_new_body: bool) -> Result<()> {
    let has_body = has_new_body || !ds.body_path.is_empty();
    match &ds.structure {
        Some(st) => {
            st.body_format()?;
            if let Some(schema) = &st.schema {
                if schema.get("type").and_then(|t| t.as_str()).is_none() {
                    return Err(RepoError::Validation("structure schema must declare a type".to_string()));
                }
            }
        }
        None if has_body => {
            return Err(RepoError::Validation("a dataset with a body requires a structure".to_string()));
        }
        None => {}
    }
    if let Some(t) = &ds.transform {
        if !t.script.is_empty() && t.syntax.is_empty() {
            return Err(RepoError::Validation("transform script requires a syntax".to_string()));
        }
    }
    Ok(())
}

fn same_bytes(store: &dyn ContentStore, path: &str, bytes: &[u8]) -> bool {
    store.get(path).map(|b| b == bytes).unwrap_or(false)
}

/// Components whose content differs between `prev` and `next`.
fn changed(prev: &Dataset, next: &Dataset) -> Vec<&'static str> {
    let mut out = Vec::new();
    if prev.meta != next.meta {
        out.push("meta");
    }
    let shape = |d: &Dataset| d.structure.as_ref().map(|s| (s.format.clone(), s.schema.clone(), s.format_config.clone()));
    if shape(prev) != shape(next) {
        out.push("structure");
    }
    if prev.body_path != next.body_path {
        out.push("body");
    }
    if prev.transform != next.transform {
        out.push("transform");
    }
    if prev.readme != next.readme {
        out.push("readme");
    }
    out
}

fn commit_title(changes: &DatasetPatch, prev: Option<&Dataset>, next: &Dataset) -> String {
    if let Some(title) = changes.commit.as_ref().and_then(|c| c.title.clone()) {
        if !title.is_empty() {
            return title;
        }
    }
    let Some(prev) = prev else {
        return match &changes.body {
            Some(body) => format!("created dataset from {}", body.basename()),
            None => "created dataset".to_string(),
        };
    };
    match changed(prev, next).as_slice() {
        [] => "updated dataset".to_string(),
        [one] => format!("{one} changed"),
        [a, b] => format!("updated {a} and {b}"),
        [rest @ .., last] => format!("updated {}, and {last}", rest.join(", ")),
    }
}

fn record(repo: &Repo, reference: &Ref, ds: &Dataset, use_dscache: bool) -> Result<()> {
    let span = repo.diag().span();
    repo.refs().put_ref(reference)?;

    let book = repo.logbook();
    let init_id = match book.ref_to_init_id(reference) {
        Ok(id) => Some(id),
        Err(RepoError::NotFound(_)) => {
            Some(book.write_dataset_init(&reference.username, &reference.profile_id, &reference.name)?)
        }
        Err(RepoError::NoLogbook) => None,
        Err(e) => return Err(e),
    };
    let Some(init_id) = init_id else {
        tracing::debug!(parent: span, "no logbook, version recorded in ref store only");
        return Ok(());
    };
    match book.write_version_save(&init_id, ds) {
        Ok(()) => {}
        Err(RepoError::NoLogbook) => {
            tracing::debug!(parent: span, "no logbook, skipping version write");
        }
        Err(e) => return Err(e),
    }

    let merged = repo.update_dscache(use_dscache, |cache| {
        cache.merge_save(book.as_ref(), &init_id, &reference.username, &reference.profile_id, &reference.name, ds)
    });
    match merged {
        Ok(_) => Ok(()),
        Err(RepoError::NoLogbook) => {
            tracing::warn!(parent: span, "dscache requested but this repo has no logbook to build it from");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
