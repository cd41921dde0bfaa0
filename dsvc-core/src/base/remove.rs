// src/base/remove.rs
//! Dropping versions from the head of a dataset.
//!
//! Snapshots stay in the content store; only the ref store, logbook and
//! dscache stop pointing at them.

use std::str::FromStr;

use crate::dsref::Ref;
use crate::error::{RepoError, Result};
use crate::repo::Repo;
use crate::store::load_dataset_refs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revisions {
    All,
    /// Newest `n` versions.
    Count(usize),
}

impl FromStr for Revisions {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Revisions::All);
        }
        match s.parse::<usize>() {
            Ok(0) | Err(_) => Err(RepoError::Validation(format!(
                "revisions must be \"all\" or a positive number, got \"{s}\""
            ))),
            Ok(n) => Ok(Revisions::Count(n)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveResult {
    /// New head, or the removed ref with an empty path when nothing is left.
    pub head: Ref,
    pub removed: usize,
    pub deleted_dataset: bool,
}

pub fn remove(repo: &Repo, r: &Ref, revisions: Revisions) -> Result<RemoveResult> {
    let span = repo.diag().span();
    let mut r = r.clone();
    repo.expand_alias(&mut r);
    let head = repo
        .refs()
        .get_ref(&r.username, &r.name)?
        .ok_or_else(|| RepoError::NotFound(r.alias()))?;

    // Collect history newest first; the store is local so no time budget applies.
    let store = repo.store().as_ref();
    let mut chain = vec![head.path.clone()];
    let mut ds = load_dataset_refs(store, &head.path)?;
    while !ds.previous_path.is_empty() {
        chain.push(ds.previous_path.clone());
        ds = load_dataset_refs(store, &ds.previous_path)?;
    }
    let total = chain.len();
    let count = match revisions {
        Revisions::All => total,
        Revisions::Count(n) => n.min(total),
    };

    let init_id = match repo.logbook().ref_to_init_id(&head) {
        Ok(id) => Some(id),
        Err(RepoError::NotFound(_)) | Err(RepoError::NoLogbook) => None,
        Err(e) => return Err(e),
    };

    if count == total {
        repo.refs().delete_ref(&head.username, &head.name)?;
        if let Some(id) = &init_id {
            repo.logbook().write_dataset_delete(id)?;
            drop_from_dscache(repo, id, usize::MAX)?;
        }
        tracing::info!(parent: span, dataset = %head.alias(), versions = total, "removed dataset");
        return Ok(RemoveResult {
            head: Ref {
                path: String::new(),
                ..head
            },
            removed: total,
            deleted_dataset: true,
        });
    }

    let new_head = Ref {
        path: chain[count].clone(),
        ..head.clone()
    };
    repo.refs().put_ref(&new_head)?;
    if let Some(id) = &init_id {
        repo.logbook().write_version_delete(id, count)?;
        drop_from_dscache(repo, id, count)?;
    }
    tracing::info!(parent: span, dataset = %head.alias(), removed = count, head = %new_head.path, "removed versions");
    Ok(RemoveResult {
        head: new_head,
        removed: count,
        deleted_dataset: false,
    })
}

fn drop_from_dscache(repo: &Repo, init_id: &str, count: usize) -> Result<()> {
    let store = repo.store().as_ref();
    let updated = repo.update_dscache(false, |cache| {
        let Some(top) = cache.refs.iter().find(|e| e.init_id == init_id).map(|e| e.top_index) else {
            return Ok(());
        };
        cache.remove_versions(store, init_id, top.saturating_sub(count))
    })?;
    if !updated {
        tracing::trace!(parent: repo.diag().span(), "no dscache to update");
    }
    Ok(())
}
