use std::io;
use std::sync::Arc;

use dsvc_core::base::{remove, save, Revisions, SaveSwitches};
use dsvc_core::dataset::DatasetPatch;
use dsvc_core::dsref::Ref;
use dsvc_core::logbook::{Logbook, NoBook};
use dsvc_core::transform::Secrets;
use dsvc_core::{Profile, Repo, RepoError};

fn repo() -> Repo {
    Repo::in_memory(Profile::new("test_peer", "QmTestPeer"))
}

fn save_versions(repo: &Repo, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let body = serde_json::to_vec(&serde_json::json!([[i]])).expect("body");
            let changes = DatasetPatch::default().with_name("movies").with_body("movies.json", body);
            save(repo, changes, &Secrets::new(), &SaveSwitches::default(), &mut io::sink())
                .expect("save")
                .reference
                .path
        })
        .collect()
}

#[test]
fn removing_some_versions_moves_the_head_back() {
    let repo = repo();
    let paths = save_versions(&repo, 3);

    let res = remove(&repo, &Ref::new("me", "movies"), Revisions::Count(2)).expect("remove");
    assert_eq!(res.removed, 2);
    assert!(!res.deleted_dataset);
    assert_eq!(res.head.path, paths[0]);

    let head = repo.refs().get_ref("test_peer", "movies").expect("get").expect("still there");
    assert_eq!(head.path, paths[0]);
    let items = repo.logbook().items(&head, 0, None).expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].path, paths[0]);
    // the snapshots themselves stay in the store
    assert!(repo.store().has(&paths[2]).expect("has"));
}

#[test]
fn removing_every_version_deletes_the_dataset() {
    let repo = repo();
    save_versions(&repo, 2);

    let res = remove(&repo, &Ref::new("test_peer", "movies"), Revisions::Count(5)).expect("remove");
    assert!(res.deleted_dataset);
    assert_eq!(res.removed, 2);
    assert!(res.head.path.is_empty());
    assert!(repo.refs().get_ref("test_peer", "movies").expect("get").is_none());
    assert!(matches!(
        repo.logbook().ref_to_init_id(&Ref::new("test_peer", "movies")),
        Err(RepoError::NotFound(_))
    ));

    // the name is free again and starts a fresh lineage
    let paths = save_versions(&repo, 1);
    let head = repo.refs().get_ref("test_peer", "movies").expect("get").expect("recreated");
    assert_eq!(head.path, paths[0]);
    assert_eq!(repo.logbook().items(&head, 0, None).expect("items").len(), 1);
}

#[test]
fn removal_works_without_a_logbook() {
    let repo = repo().with_logbook(Arc::new(NoBook));
    let paths = save_versions(&repo, 2);
    let res = remove(&repo, &Ref::new("test_peer", "movies"), Revisions::Count(1)).expect("remove");
    assert_eq!(res.head.path, paths[0]);
    let res = remove(&repo, &Ref::new("test_peer", "movies"), Revisions::All).expect("remove all");
    assert!(res.deleted_dataset);
}

#[test]
fn unknown_datasets_cannot_be_removed() {
    let err = remove(&repo(), &Ref::new("test_peer", "nope"), Revisions::All).expect_err("unknown");
    assert!(matches!(err, RepoError::NotFound(_)), "got {err:?}");
}

#[test]
fn revision_counts_parse() {
    assert_eq!("all".parse::<Revisions>().expect("all"), Revisions::All);
    assert_eq!("ALL".parse::<Revisions>().expect("ALL"), Revisions::All);
    assert_eq!("3".parse::<Revisions>().expect("3"), Revisions::Count(3));
    assert!("0".parse::<Revisions>().is_err());
    assert!("-1".parse::<Revisions>().is_err());
    assert!("some".parse::<Revisions>().is_err());
}
