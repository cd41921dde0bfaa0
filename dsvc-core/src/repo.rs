// src/repo.rs
//! A repo bundles everything the pipelines operate on: content store, ref
//! store, logbook, optional dscache, the acting profile and a background task
//! queue. Optional capabilities (search, reindex, transforms) are plugged in
//! explicitly; asking for one that is missing fails with `Unsupported`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context as _;

use crate::config::{RepoConfig, StoreKind};
use crate::dscache::Dscache;
use crate::dsref::Ref;
use crate::error::{RepoError, Result};
use crate::logbook::{Book, Logbook, NoBook};
use crate::refstore::RefStore;
use crate::store::{ContentStore, FsStore, MemStore};
use crate::transform::TransformRunner;
use crate::utils::diag::Diagnostics;
use crate::utils::tasks::{TaskOutcome, TaskQueue};

/// Alias that always means the acting profile.
pub const ME: &str = "me";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub peername: String,
    pub id: String,
}

impl Profile {
    pub fn new(peername: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            peername: peername.into(),
            id: id.into(),
        }
    }
}

pub trait Searchable: Send + Sync {
    fn search(&self, query: &str, offset: usize, limit: Option<usize>) -> Result<Vec<Ref>>;
}

pub trait Reindexable: Send + Sync {
    fn reindex(&self, r: &Ref) -> Result<()>;
}

pub struct Repo {
    root: Option<PathBuf>,
    store: Arc<dyn ContentStore>,
    refs: RefStore,
    book: Arc<dyn Logbook>,
    dscache: Mutex<Option<Dscache>>,
    dscache_file: Option<PathBuf>,
    profile: Profile,
    tasks: TaskQueue,
    history_timeout: Duration,
    transformer: Option<Arc<dyn TransformRunner>>,
    searcher: Option<Arc<dyn Searchable>>,
    reindexer: Option<Arc<dyn Reindexable>>,
    diag: Diagnostics,
}

impl Repo {
    /// Open (initializing if needed) the repo rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).with_context(|| format!("creating repo root {}", root.display()))?;
        let cfg = RepoConfig::load_or_init(root)?;
        Self::from_config(root, &cfg)
    }

    pub fn from_config(root: &Path, cfg: &RepoConfig) -> anyhow::Result<Self> {
        let diag = Diagnostics::for_root(root);
        let store: Arc<dyn ContentStore> = match cfg.store.kind {
            StoreKind::Fs => Arc::new(
                FsStore::open(&cfg.store.path)
                    .with_context(|| format!("opening content store {}", cfg.store.path.display()))?,
            ),
            StoreKind::Mem => Arc::new(MemStore::new()),
        };
        let refs = RefStore::open(root.join("refs.json")).context("opening ref store")?;
        let book: Arc<dyn Logbook> = if cfg.logbook.enabled {
            Arc::new(
                Book::open(&cfg.logbook.path, diag.clone())
                    .with_context(|| format!("opening logbook {}", cfg.logbook.path.display()))?,
            )
        } else {
            Arc::new(NoBook)
        };
        let dscache = Dscache::load(&cfg.dscache.path)
            .with_context(|| format!("loading dscache {}", cfg.dscache.path.display()))?;
        tracing::debug!(
            parent: diag.span(),
            store = store.kind(),
            logbook = cfg.logbook.enabled,
            dscache = dscache.is_some(),
            "repo opened"
        );
        Ok(Self {
            root: Some(root.to_path_buf()),
            store,
            refs,
            book,
            dscache: Mutex::new(dscache),
            dscache_file: Some(cfg.dscache.path.clone()),
            profile: Profile::new(cfg.profile.peername.clone(), cfg.profile.id.clone()),
            tasks: TaskQueue::start(diag.span().clone()),
            history_timeout: Duration::from_millis(cfg.history.timeout_ms),
            transformer: None,
            searcher: None,
            reindexer: None,
            diag,
        })
    }

    /// Fully in-memory repo: `MemStore`, in-memory refs and logbook, no dscache file.
    pub fn in_memory(profile: Profile) -> Self {
        let diag = Diagnostics::in_memory();
        Self {
            root: None,
            store: Arc::new(MemStore::new()),
            refs: RefStore::in_memory(),
            book: Arc::new(Book::in_memory(diag.clone())),
            dscache: Mutex::new(None),
            dscache_file: None,
            profile,
            tasks: TaskQueue::start(diag.span().clone()),
            history_timeout: Duration::from_millis(100),
            transformer: None,
            searcher: None,
            reindexer: None,
            diag,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_logbook(mut self, book: Arc<dyn Logbook>) -> Self {
        self.book = book;
        self
    }

    pub fn with_history_timeout(mut self, timeout: Duration) -> Self {
        self.history_timeout = timeout;
        self
    }

    pub fn with_transform_runner(mut self, runner: Arc<dyn TransformRunner>) -> Self {
        self.transformer = Some(runner);
        self
    }

    pub fn with_searcher(mut self, searcher: Arc<dyn Searchable>) -> Self {
        self.searcher = Some(searcher);
        self
    }

    pub fn with_reindexer(mut self, reindexer: Arc<dyn Reindexable>) -> Self {
        self.reindexer = Some(reindexer);
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn logbook(&self) -> &Arc<dyn Logbook> {
        &self.book
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn diag(&self) -> &Diagnostics {
        &self.diag
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    /// Outcomes of background jobs such as logbook backfills.
    pub fn task_outcomes(&self) -> crossbeam_channel::Receiver<TaskOutcome> {
        self.tasks.outcomes()
    }

    pub fn history_timeout(&self) -> Duration {
        self.history_timeout
    }

    pub fn transformer(&self) -> Option<&Arc<dyn TransformRunner>> {
        self.transformer.as_ref()
    }

    /// Replace the `me` alias with the acting peername.
    pub fn expand_alias(&self, r: &mut Ref) {
        if r.username == ME {
            r.username = self.profile.peername.clone();
        }
    }

    /// Expand the alias and fill in profile and head path from the ref store.
    pub fn resolve(&self, r: &mut Ref) -> Result<()> {
        self.expand_alias(r);
        self.refs.canonicalize(r)
    }

    fn lock_dscache(&self) -> Result<MutexGuard<'_, Option<Dscache>>> {
        self.dscache
            .lock()
            .map_err(|_| RepoError::Store("dscache lock poisoned".to_string()))
    }

    /// Snapshot of the current dscache, if one exists.
    pub fn dscache(&self) -> Result<Option<Dscache>> {
        Ok(self.lock_dscache()?.clone())
    }

    /// Run `f` against the dscache and persist it afterwards. `create` builds
    /// the cache from the logbook first when there is none yet; without it an
    /// absent cache stays absent and `f` is skipped.
    pub fn update_dscache(&self, create: bool, f: impl FnOnce(&mut Dscache) -> Result<()>) -> Result<bool> {
        let mut guard = self.lock_dscache()?;
        if guard.is_none() {
            if !create {
                return Ok(false);
            }
            let built = Dscache::rebuild(self.book.as_ref(), self.dscache_file.clone())?;
            tracing::debug!(parent: self.diag.span(), refs = built.refs.len(), "dscache built from logbook");
            *guard = Some(built);
        }
        let Some(cache) = guard.as_mut() else {
            return Ok(false);
        };
        f(cache)?;
        cache.save()?;
        Ok(true)
    }

    /// Throw away the current dscache and replay the logbook into a new one.
    pub fn rebuild_dscache(&self) -> Result<Dscache> {
        let mut cache = Dscache::rebuild(self.book.as_ref(), self.dscache_file.clone())?;
        cache.save()?;
        *self.lock_dscache()? = Some(cache.clone());
        Ok(cache)
    }

    pub fn search(&self, query: &str, offset: usize, limit: Option<usize>) -> Result<Vec<Ref>> {
        match &self.searcher {
            Some(s) => s.search(query, offset, limit),
            None => Err(RepoError::Unsupported("this repo does not support search".to_string())),
        }
    }

    pub fn reindex(&self, r: &Ref) -> Result<()> {
        match &self.reindexer {
            Some(s) => s.reindex(r),
            None => Err(RepoError::Unsupported("this repo does not support reindexing".to_string())),
        }
    }
}
