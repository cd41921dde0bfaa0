// src/base/list.rs
use crate::dscache::RefEntry;
use crate::error::{RepoError, Result};
use crate::repo::Repo;
use crate::store::load_dataset;

/// Datasets in this repo, ordered by name.
///
/// Served from the dscache when one exists. `use_dscache` builds it from the
/// logbook first if it does not; otherwise entries are assembled from the ref
/// store by loading each head. A repo without a logbook always lists from the
/// ref store.
pub fn list(repo: &Repo, offset: usize, limit: Option<usize>, use_dscache: bool) -> Result<Vec<RefEntry>> {
    let mut page = None;
    let served = repo.update_dscache(use_dscache, |cache| {
        page = Some(cache.list(offset, limit));
        Ok(())
    });
    match served {
        Ok(_) => {}
        Err(RepoError::NoLogbook) => {
            tracing::warn!(parent: repo.diag().span(), "no logbook to build a dscache from, listing the ref store");
        }
        Err(e) => return Err(e),
    }
    if let Some(page) = page {
        return Ok(page);
    }

    let store = repo.store().as_ref();
    let mut out = Vec::new();
    let mut refs = repo.refs().list()?;
    refs.sort_by(|a, b| a.name.cmp(&b.name));
    for r in refs.into_iter().skip(offset).take(limit.unwrap_or(usize::MAX)) {
        let head = load_dataset(store, &r.path)?;
        let mut top_index = 1;
        let mut prev = head.previous_path.clone();
        while !prev.is_empty() {
            top_index += 1;
            prev = load_dataset(store, &prev)?.previous_path;
        }
        let init_id = match repo.logbook().ref_to_init_id(&r) {
            Ok(id) => id,
            Err(RepoError::NotFound(_)) | Err(RepoError::NoLogbook) => String::new(),
            Err(e) => return Err(e),
        };
        out.push(RefEntry {
            init_id,
            profile_id: r.profile_id.clone(),
            top_index,
            cursor_index: top_index,
            pretty_name: r.name.clone(),
            body_size: head.body_size(),
            body_rows: head.body_rows(),
            commit_time: head.commit_time(),
            num_errors: head.num_errors(),
            head_ref: r.path.clone(),
        });
    }
    Ok(out)
}
