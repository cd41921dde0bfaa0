use std::fs;
use std::sync::Arc;
use std::time::Duration;

use dsvc_core::config::{RepoConfig, StoreKind};
use dsvc_core::dsref::Ref;
use dsvc_core::logbook::{Book, Logbook};
use dsvc_core::refstore::RefStore;
use dsvc_core::repo::{Reindexable, Searchable};
use dsvc_core::store::{ContentStore, FsStore, MemStore};
use dsvc_core::utils::diag::Diagnostics;
use dsvc_core::{Profile, Repo, RepoError, Result};
use tempfile::TempDir;

#[test]
fn config_defaults_resolve_under_the_root() {
    let dir = TempDir::new().expect("tempdir");
    let cfg = RepoConfig::load(dir.path()).expect("load defaults");
    assert_eq!(cfg.profile.peername, "me");
    assert_eq!(cfg.store.kind, StoreKind::Fs);
    assert_eq!(cfg.store.path, dir.path().join("store"));
    assert_eq!(cfg.logbook.path, dir.path().join("logbook.jsonl"));
    assert!(cfg.logbook.enabled);
    assert_eq!(cfg.dscache.path, dir.path().join("dscache.json"));
    assert_eq!(cfg.history.timeout_ms, 100);
}

#[test]
fn config_file_overrides_defaults() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("config.toml"),
        "[profile]\npeername = \"test_peer\"\nid = \"QmTestPeer\"\n\n[store]\nkind = \"mem\"\n\n[history]\ntimeout_ms = 250\n",
    )
    .expect("write config");
    let cfg = RepoConfig::load(dir.path()).expect("load");
    assert_eq!(cfg.profile.peername, "test_peer");
    assert_eq!(cfg.profile.id, "QmTestPeer");
    assert_eq!(cfg.store.kind, StoreKind::Mem);
    assert_eq!(cfg.history.timeout_ms, 250);
    assert!(cfg.logbook.enabled);

    let repo = Repo::from_config(dir.path(), &cfg).expect("repo");
    assert_eq!(repo.store().kind(), "mem");
    assert_eq!(repo.history_timeout(), Duration::from_millis(250));
    assert_eq!(repo.profile(), &Profile::new("test_peer", "QmTestPeer"));
}

#[test]
fn malformed_config_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("config.toml"), "[history]\ntimeout_ms = \"soon\"\n").expect("write");
    let err = RepoConfig::load(dir.path()).expect_err("bad config");
    assert!(format!("{err:#}").contains("parsing config file"));
}

#[test]
fn opening_a_repo_mints_a_stable_profile_id() {
    let dir = TempDir::new().expect("tempdir");
    let id = Repo::open(dir.path()).expect("open").profile().id.clone();
    assert!(!id.is_empty());
    assert!(bs58::decode(&id).into_vec().is_ok());
    assert!(dir.path().join("config.toml").exists());

    let again = Repo::open(dir.path()).expect("reopen");
    assert_eq!(again.profile().id, id);
}

#[test]
fn stores_address_content_by_hash() {
    let dir = TempDir::new().expect("tempdir");
    let fs_store = FsStore::open(dir.path().join("blobs")).expect("fs store");
    let mem = MemStore::new();

    let a = fs_store.put(b"hello").expect("put");
    assert_eq!(fs_store.put(b"hello").expect("put again"), a);
    assert!(a.starts_with("/fs/"));
    assert_eq!(fs_store.get(&a).expect("get"), b"hello");
    assert!(fs_store.has(&a).expect("has"));

    let m = mem.put(b"hello").expect("put");
    assert_eq!(m.rsplit('/').next(), a.rsplit('/').next(), "same bytes, same hash");
    assert!(!fs_store.has(&m).expect("foreign kind"));
    assert!(matches!(mem.get("/mem/missing"), Err(RepoError::NotFound(_))));
}

#[test]
fn overlay_reads_through_but_never_writes_back() {
    let base: Arc<dyn ContentStore> = Arc::new(MemStore::new());
    let existing = base.put(b"base").expect("put");
    let overlay = MemStore::overlay(Arc::clone(&base));

    assert_eq!(overlay.get(&existing).expect("read through"), b"base");
    let added = overlay.put(b"overlay only").expect("put");
    assert!(overlay.has(&added).expect("has"));
    assert!(!base.has(&added).expect("base has"));
    assert_eq!(overlay.len(), 1);
}

#[test]
fn refs_and_logbook_survive_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let head = Ref {
        username: "test_peer".into(),
        profile_id: "QmTestPeer".into(),
        name: "movies".into(),
        path: "/fs/QmHead".into(),
    };
    {
        let refs = RefStore::open(dir.path().join("refs.json")).expect("refs");
        refs.put_ref(&head).expect("put ref");
        let book = Book::open(dir.path().join("log.jsonl"), Diagnostics::in_memory()).expect("book");
        let id = book.write_dataset_init("test_peer", "QmTestPeer", "movies").expect("init");
        assert_eq!(id.len(), 32);
    }

    let refs = RefStore::open(dir.path().join("refs.json")).expect("reopen refs");
    let mut partial = Ref::new("test_peer", "movies");
    refs.canonicalize(&mut partial).expect("canonicalize");
    assert_eq!(partial, head);
    assert!(refs.put_ref(&Ref::new("test_peer", "no_path")).is_err());

    let book = Book::open(dir.path().join("log.jsonl"), Diagnostics::in_memory()).expect("reopen book");
    assert!(book.has_entries(&head).expect("has entries"));
    assert!(matches!(book.items(&head, 0, None), Err(RepoError::NoHistory)));
}

#[test]
fn a_torn_logbook_line_is_skipped_on_open() {
    let dir = TempDir::new().expect("tempdir");
    let file = dir.path().join("logbook.jsonl");
    let movies = Ref::new("test_peer", "movies");
    {
        let book = Book::open(&file, Diagnostics::in_memory()).expect("book");
        book.write_dataset_init("test_peer", "QmTestPeer", "movies").expect("init");
    }
    let mut text = fs::read_to_string(&file).expect("read log");
    text.push_str(r#"{"init_id":"abc","ts":"20"#);
    fs::write(&file, text).expect("tear log");

    let book = Book::open(&file, Diagnostics::in_memory()).expect("open torn log");
    assert!(book.has_entries(&movies).expect("has entries"));
    book.write_dataset_init("test_peer", "QmTestPeer", "shows").expect("append after tear");

    let book = Book::open(&file, Diagnostics::in_memory()).expect("reopen");
    assert!(book.has_entries(&movies).expect("movies"));
    assert!(book.has_entries(&Ref::new("test_peer", "shows")).expect("shows"));
    assert!(Repo::open(dir.path()).is_ok());
}

struct NameSearch;

impl Searchable for NameSearch {
    fn search(&self, query: &str, _offset: usize, _limit: Option<usize>) -> Result<Vec<Ref>> {
        Ok(vec![Ref::new("test_peer", query)])
    }
}

struct RejectAll;

impl Reindexable for RejectAll {
    fn reindex(&self, r: &Ref) -> Result<()> {
        Err(RepoError::NotFound(r.alias()))
    }
}

#[test]
fn optional_capabilities_are_explicit() {
    let repo = Repo::in_memory(Profile::new("test_peer", "QmTestPeer"));
    assert!(matches!(repo.search("movies", 0, None), Err(RepoError::Unsupported(_))));
    assert!(matches!(repo.reindex(&Ref::new("test_peer", "movies")), Err(RepoError::Unsupported(_))));

    let repo = repo.with_searcher(Arc::new(NameSearch));
    let found = repo.search("movies", 0, None).expect("search");
    assert_eq!(found, vec![Ref::new("test_peer", "movies")]);

    let repo = repo.with_reindexer(Arc::new(RejectAll));
    assert!(matches!(repo.reindex(&Ref::new("test_peer", "movies")), Err(RepoError::NotFound(_))));
}
