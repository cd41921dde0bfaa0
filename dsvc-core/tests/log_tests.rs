use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dsvc_core::base::{dataset_log, save, walk_history, SaveSwitches};
use dsvc_core::dataset::DatasetPatch;
use dsvc_core::dsref::Ref;
use dsvc_core::logbook::{Book, Logbook, NoBook};
use dsvc_core::store::{ContentStore, MemStore};
use dsvc_core::transform::Secrets;
use dsvc_core::utils::cancel::Context;
use dsvc_core::utils::diag::Diagnostics;
use dsvc_core::{Profile, Repo, RepoError, Result};

fn repo() -> Repo {
    Repo::in_memory(Profile::new("test_peer", "QmTestPeer"))
}

/// Saves `n` versions of `test_peer/movies`; returns head paths oldest first.
fn save_versions(repo: &Repo, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let body = serde_json::to_vec(&serde_json::json!([["movie", i]])).expect("body");
            let changes = DatasetPatch {
                commit: Some(dsvc_core::dataset::CommitPatch {
                    title: Some(format!("version {i}")),
                    message: Some(format!("message {i}")),
                }),
                ..DatasetPatch::default().with_name("movies").with_body(format!("body_{i}.json"), body)
            };
            save(repo, changes, &Secrets::new(), &SaveSwitches::default(), &mut io::sink())
                .expect("save")
                .reference
                .path
        })
        .collect()
}

fn movies() -> Ref {
    Ref::new("test_peer", "movies")
}

/// Serves only `allow`; every other read blocks for an hour.
struct GateStore {
    inner: Arc<dyn ContentStore>,
    allow: Vec<String>,
}

impl ContentStore for GateStore {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    fn has(&self, path: &str) -> Result<bool> {
        self.inner.has(path)
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        if !self.allow.iter().any(|p| p == path) {
            thread::sleep(Duration::from_secs(3600));
        }
        self.inner.get(path)
    }

    fn put(&self, bytes: &[u8]) -> Result<String> {
        self.inner.put(bytes)
    }
}

#[test]
fn log_is_newest_first_and_hydrated() {
    let repo = repo();
    let paths = save_versions(&repo, 3);

    let items = dataset_log(&repo, &Context::background(), &movies(), 0, None, true).expect("log");
    assert_eq!(items.len(), 3);
    let got: Vec<&str> = items.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(got, vec![paths[2].as_str(), paths[1].as_str(), paths[0].as_str()]);
    assert_eq!(items[0].commit_title, "version 2");
    assert_eq!(items[2].commit_message, "message 0");
    assert!(items.iter().all(|i| !i.foreign));
    assert!(items.iter().all(|i| i.body_rows == 1));

    let page = dataset_log(&repo, &Context::background(), &movies(), 1, Some(1), true).expect("page");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].path, paths[1]);

    let err = dataset_log(&repo, &Context::background(), &movies(), 10, None, true).expect_err("past the end");
    assert!(matches!(err.error, RepoError::NoHistory), "got {:?}", err.error);
}

#[test]
fn me_alias_resolves_to_the_peername() {
    let repo = repo();
    save_versions(&repo, 1);
    let items = dataset_log(&repo, &Context::background(), &Ref::new("me", "movies"), 0, None, true).expect("log");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].username, "test_peer");
}

#[test]
fn versions_missing_from_the_local_store_are_foreign() {
    let repo = repo();
    save_versions(&repo, 2);
    let repo = repo.with_store(Arc::new(MemStore::new()));

    let items = dataset_log(&repo, &Context::background(), &movies(), 0, None, true).expect("log");
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.foreign));
    assert!(items.iter().all(|i| i.commit_title.is_empty()));
}

#[test]
fn without_a_logbook_history_is_walked_from_content() {
    let repo = repo().with_logbook(Arc::new(NoBook));
    let paths = save_versions(&repo, 3);

    let items = dataset_log(&repo, &Context::background(), &movies(), 0, None, false).expect("walked log");
    let got: Vec<&str> = items.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(got, vec![paths[2].as_str(), paths[1].as_str(), paths[0].as_str()]);
    assert_eq!(items[1].commit_title, "version 1");
    assert_eq!(items[0].profile_id, "QmTestPeer");

    let page = dataset_log(&repo, &Context::background(), &movies(), 1, Some(5), true).expect("walked page");
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].path, paths[1]);
    assert_eq!(page[0].body_rows, 1);
}

#[test]
fn walk_limits_and_offsets() {
    let repo = repo();
    let paths = save_versions(&repo, 4);
    let head = movies().with_path(paths[3].clone());
    let store = Arc::clone(repo.store());
    let timeout = Duration::from_secs(5);

    let all = walk_history(Arc::clone(&store), &Context::background(), &head, 0, None, true, timeout).expect("all");
    assert_eq!(all.len(), 4);
    assert!(all[0].structure.is_some());

    let some = walk_history(Arc::clone(&store), &Context::background(), &head, 1, Some(2), false, timeout).expect("some");
    assert_eq!(some.iter().map(|d| d.path.clone()).collect::<Vec<_>>(), vec![paths[2].clone(), paths[1].clone()]);
    assert!(some[0].structure.is_none(), "refs-only load skips components");
    assert!(some[0].commit.is_some());

    let none = walk_history(Arc::clone(&store), &Context::background(), &head, 0, Some(0), true, timeout).expect("zero");
    assert!(none.is_empty());

    let err = walk_history(store, &Context::background(), &movies(), 0, None, true, timeout).expect_err("no path");
    assert!(matches!(err.error, RepoError::NoHistory));
}

#[test]
fn walked_history_backfills_the_logbook() {
    let repo = repo().with_logbook(Arc::new(NoBook));
    let paths = save_versions(&repo, 2);
    let book = Arc::new(Book::in_memory(Diagnostics::in_memory()));
    let repo = repo.with_logbook(book.clone());

    let items = dataset_log(&repo, &Context::background(), &movies(), 0, None, true).expect("walked log");
    assert_eq!(items.len(), 2);

    let outcome = repo
        .task_outcomes()
        .recv_timeout(Duration::from_secs(5))
        .expect("backfill outcome");
    assert!(outcome.name.contains("test_peer/movies"), "task {}", outcome.name);
    assert_eq!(outcome.result, Ok(()));

    let logged = book.items(&movies(), 0, None).expect("backfilled items");
    let got: Vec<&str> = logged.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(got, vec![paths[1].as_str(), paths[0].as_str()]);

    // served from the logbook now, still hydrated from the store
    let again = dataset_log(&repo, &Context::background(), &movies(), 0, None, true).expect("log");
    assert_eq!(again[0].commit_title, "version 1");
}

#[test]
fn slow_walks_time_out_within_the_budget() {
    let repo = repo().with_logbook(Arc::new(NoBook));
    save_versions(&repo, 1);
    let gate = GateStore {
        inner: Arc::clone(repo.store()),
        allow: Vec::new(),
    };
    let repo = repo.with_store(Arc::new(gate)).with_history_timeout(Duration::from_millis(50));

    let started = Instant::now();
    let err = dataset_log(&repo, &Context::background(), &movies(), 0, None, true).expect_err("timeout");
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert!(matches!(err.error, RepoError::Timeout), "got {:?}", err.error);
    assert!(err.partial.is_empty());
    assert_eq!(err.to_string(), "datasetLog: timeout");
}

#[test]
fn timeouts_keep_what_was_collected() {
    let repo = repo().with_logbook(Arc::new(NoBook));
    let paths = save_versions(&repo, 3);
    let gate = GateStore {
        inner: Arc::clone(repo.store()),
        allow: vec![paths[2].clone()],
    };
    let repo = repo.with_store(Arc::new(gate)).with_history_timeout(Duration::from_millis(100));

    let err = dataset_log(&repo, &Context::background(), &movies(), 0, None, true).expect_err("timeout");
    assert!(matches!(err.error, RepoError::Timeout));
    assert_eq!(err.partial.len(), 1);
    assert_eq!(err.partial[0].path, paths[2]);
}

#[test]
fn caller_cancellation_stops_the_walk() {
    let repo = repo().with_logbook(Arc::new(NoBook));
    save_versions(&repo, 1);
    let gate = GateStore {
        inner: Arc::clone(repo.store()),
        allow: Vec::new(),
    };
    let repo = repo.with_store(Arc::new(gate)).with_history_timeout(Duration::from_secs(60));

    let (ctx, handle) = Context::with_cancel();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        drop(handle);
    });
    let started = Instant::now();
    let err = dataset_log(&repo, &ctx, &movies(), 0, None, true).expect_err("cancelled");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(err.error, RepoError::Timeout));
    assert!(ctx.is_cancelled());
}

#[test]
fn missing_snapshots_fail_the_walk() {
    let repo = repo().with_logbook(Arc::new(NoBook));
    save_versions(&repo, 1);
    let repo = repo.with_store(Arc::new(MemStore::new()));

    let err = dataset_log(&repo, &Context::background(), &movies(), 0, None, true).expect_err("missing");
    assert!(matches!(err.error, RepoError::NotFound(_)), "got {:?}", err.error);
}

#[test]
fn unknown_datasets_are_not_found() {
    let repo = repo();
    let err = dataset_log(&repo, &Context::background(), &Ref::new("test_peer", "nope"), 0, None, true)
        .expect_err("unknown");
    assert!(matches!(err.error, RepoError::NotFound(_)), "got {:?}", err.error);
}
