//! dsvc-core: version control for structured datasets.
//!
//! Saves produce immutable, content-addressed snapshots linked to their
//! predecessor. The logbook records every version; the dscache is a
//! disposable listing rebuilt from it.

pub mod base;
pub mod config;
pub mod dataset;
pub mod dscache;
pub mod dsref;
pub mod error;
pub mod logbook;
pub mod refstore;
pub mod repo;
pub mod store;
pub mod transform;
pub mod utils;

pub use error::{HistoryError, RepoError, Result};
pub use repo::{Profile, Repo};
