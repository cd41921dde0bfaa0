// src/error.rs
//! Error taxonomy surfaced to callers.
//!
//! Every variant has a stable identity (match on the variant, never on the
//! message) plus a human-readable message. This crate never prints; callers
//! decide how to present these.

use std::fmt;

use crate::dsref::ParseError;

pub type Result<T, E = RepoError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Unknown name or ref.
    #[error("reference not found: {0}")]
    NotFound(String),

    /// The name exists but no versions can be resolved for it.
    #[error("repo: no history")]
    NoHistory,

    /// History walk exceeded its time budget or the caller cancelled it.
    #[error("datasetLog: timeout")]
    Timeout,

    /// Save produced a snapshot identical to the current head.
    #[error("no changes")]
    NoChanges,

    /// An explicit new-name request collides with an existing dataset.
    #[error("dataset name has a previous version, cannot make new dataset")]
    NameCollision(String),

    /// An inferred name collides and no disambiguation switch was given.
    #[error(
        "inferred dataset name already exists. To add a new commit to this dataset, run save again with the dataset reference. To create a new dataset, use --new flag"
    )]
    AmbiguousName(String),

    /// Upper-case letters in a name being created for the first time.
    #[error("dataset name may not contain any upper-case letters")]
    BadCaseName(String),

    #[error("invalid dataset: {0}")]
    Validation(String),

    #[error("Refusing to change structure from {prev} to {next}")]
    StructureMismatch { prev: String, next: String },

    /// No change log is configured; advisory at the save layer.
    #[error("logbook: this repo has no logbook")]
    NoLogbook,

    #[error("creating a new dataset requires a structure or a body")]
    RequiresStructureOrBody,

    #[error("cannot save using a different username than \"{0}\"")]
    ForeignUsername(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("store: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A history read that failed part-way. `partial` holds everything produced
/// before `error` fired and is safe to use.
#[derive(Debug)]
pub struct HistoryError<T> {
    pub partial: Vec<T>,
    pub error: RepoError,
}

impl<T> HistoryError<T> {
    pub fn new(partial: Vec<T>, error: RepoError) -> Self {
        Self { partial, error }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.error, RepoError::Timeout)
    }
}

impl<T> From<RepoError> for HistoryError<T> {
    fn from(error: RepoError) -> Self {
        Self {
            partial: Vec::new(),
            error,
        }
    }
}

impl<T> fmt::Display for HistoryError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<T: fmt::Debug> std::error::Error for HistoryError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
