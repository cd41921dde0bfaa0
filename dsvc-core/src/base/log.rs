// src/base/log.rs
//! Version history for a dataset.
//!
//! The logbook is authoritative. When it has nothing for a name, history is
//! rebuilt by walking `previous_path` links through the content store on a
//! worker thread, bounded by the repo's history timeout and the caller's
//! `Context`. A successful walk for the local profile then backfills the
//! logbook in the background.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{self as chan, select};

use crate::dataset::Dataset;
use crate::dsref::Ref;
use crate::error::{HistoryError, RepoError};
use crate::logbook::{DatasetLogItem, Logbook};
use crate::repo::Repo;
use crate::store::{load_dataset, load_dataset_refs, ContentStore};
use crate::utils::cancel::Context;

pub type HistoryResult<T> = std::result::Result<Vec<T>, HistoryError<T>>;

enum Walked {
    Version(Dataset),
    Done,
    Failed(RepoError),
}

/// History of `r`, newest first, paged by `offset`/`limit`.
///
/// # Behavior
/// - Logbook items are hydrated with commit title and message from locally
///   present snapshots; items whose snapshot is not local are marked `foreign`.
/// - Without logbook entries, falls back to `walk_history`. A timeout there
///   returns whatever was collected in `HistoryError::partial`.
pub fn dataset_log(
    repo: &Repo,
    ctx: &Context,
    r: &Ref,
    offset: usize,
    limit: Option<usize>,
    load_datasets: bool,
) -> HistoryResult<DatasetLogItem> {
    let mut r = r.clone();
    repo.expand_alias(&mut r);

    match repo.logbook().items(&r, offset, limit) {
        Ok(mut items) => {
            hydrate(repo.store().as_ref(), &mut items);
            return Ok(items);
        }
        Err(RepoError::NoHistory) => return Err(RepoError::NoHistory.into()),
        Err(e) => {
            tracing::debug!(parent: repo.diag().span(), dataset = %r.alias(), reason = %e, "no logbook entries, walking history");
        }
    }

    repo.resolve(&mut r)?;
    let walked = walk_history(
        Arc::clone(repo.store()),
        ctx,
        &r,
        offset,
        limit,
        load_datasets,
        repo.history_timeout(),
    );
    let versions = match walked {
        Ok(v) => v,
        Err(HistoryError { partial, error }) => {
            let items = partial.iter().map(|ds| DatasetLogItem::from_dataset(&r, ds)).collect();
            return Err(HistoryError::new(items, error));
        }
    };
    if versions.is_empty() {
        return Err(RepoError::NoHistory.into());
    }
    let items = versions.iter().map(|ds| DatasetLogItem::from_dataset(&r, ds)).collect();

    if r.username == repo.profile().peername {
        queue_backfill(repo, r);
    }
    Ok(items)
}

fn hydrate(store: &dyn ContentStore, items: &mut [DatasetLogItem]) {
    for item in items.iter_mut().filter(|i| !i.path.is_empty()) {
        let Ok(local) = store.has(&item.path) else {
            continue;
        };
        if local {
            if let Ok(ds) = load_dataset(store, &item.path) {
                if let Some(commit) = ds.commit {
                    item.commit_title = commit.title;
                    item.commit_message = commit.message;
                }
            }
        }
        item.foreign = !local;
    }
}

/// Seed the logbook for `r` from its walked history, off the caller's path.
fn queue_backfill(repo: &Repo, r: Ref) {
    let book = Arc::clone(repo.logbook());
    match book.has_entries(&r) {
        Ok(false) => {}
        Ok(true) | Err(_) => return,
    }
    let store = Arc::clone(repo.store());
    let timeout = repo.history_timeout();
    let name = format!("backfill logbook {}", r.alias());
    repo.tasks().spawn(name, move || construct_log_from_history(store, book, &r, timeout));
}

fn construct_log_from_history(
    store: Arc<dyn ContentStore>,
    book: Arc<dyn Logbook>,
    r: &Ref,
    timeout: Duration,
) -> anyhow::Result<()> {
    let history = walk_history(store, &Context::background(), r, 0, None, true, timeout)
        .map_err(|e| anyhow::anyhow!("walking history of {}: {}", r.alias(), e))?;
    book.construct_dataset_log(r, &history)?;
    Ok(())
}

/// Walk back from `r.path` along `previous_path`, newest first.
///
/// # Arguments
/// * `offset`   : versions to skip from the head.
/// * `limit`    : versions to return; `None` for all.
/// * `load_full`: load every component, else only links and commit.
/// * `timeout`  : budget on top of `ctx`; whichever fires first wins.
///
/// # Behavior
/// - Loads run on a worker thread that streams versions over a channel.
/// - Timeout and cancellation both yield `Timeout` plus the partial list.
/// - A failed load yields that error plus the partial list.
pub fn walk_history(
    store: Arc<dyn ContentStore>,
    ctx: &Context,
    r: &Ref,
    offset: usize,
    limit: Option<usize>,
    load_full: bool,
    timeout: Duration,
) -> HistoryResult<Dataset> {
    if r.path.is_empty() {
        return Err(RepoError::NoHistory.into());
    }
    if limit == Some(0) {
        return Ok(Vec::new());
    }
    let bounded = ctx.child_with_timeout(timeout);
    let (tx, rx) = chan::unbounded::<Walked>();
    let start = r.path.clone();

    thread::spawn(move || {
        let mut path = start;
        let mut skip = offset;
        let mut remaining = limit;
        loop {
            let loaded = if load_full {
                load_dataset(store.as_ref(), &path)
            } else {
                load_dataset_refs(store.as_ref(), &path)
            };
            let ds = match loaded {
                Ok(ds) => ds,
                Err(e) => {
                    let _ = tx.send(Walked::Failed(e));
                    return;
                }
            };
            let prev = ds.previous_path.clone();
            if skip == 0 {
                if tx.send(Walked::Version(ds)).is_err() {
                    return;
                }
                if let Some(n) = remaining.as_mut() {
                    *n -= 1;
                    if *n == 0 {
                        break;
                    }
                }
            } else {
                skip -= 1;
            }
            if prev.is_empty() {
                break;
            }
            path = prev;
        }
        let _ = tx.send(Walked::Done);
    });

    let expired = bounded.expired();
    let cancelled = bounded.done();
    let mut out = Vec::new();
    loop {
        select! {
            recv(rx) -> msg => match msg {
                Ok(Walked::Version(ds)) => out.push(ds),
                Ok(Walked::Done) => return Ok(out),
                Ok(Walked::Failed(e)) => return Err(HistoryError::new(out, e)),
                Err(_) => {
                    return Err(HistoryError::new(out, RepoError::Store("history walker exited early".to_string())));
                }
            },
            recv(expired) -> _ => return Err(HistoryError::new(out, RepoError::Timeout)),
            recv(cancelled) -> _ => return Err(HistoryError::new(out, RepoError::Timeout)),
        }
    }
}
