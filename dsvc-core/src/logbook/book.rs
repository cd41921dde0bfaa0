// src/logbook/book.rs
//! JSONL-backed logbook. One line per op:
//! `{"init_id": "...", "ts": "...", "op": {"kind": "version", ...}}`.
//! The whole file is replayed into memory on open; writes append a line and
//! then apply the op to the in-memory view under the same lock.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{mint_init_id, DatasetLog, DatasetLogItem, LogOp, Logbook, VersionEntry};
use crate::dataset::Dataset;
use crate::dsref::Ref;
use crate::error::{RepoError, Result};
use crate::utils::diag::Diagnostics;
use crate::utils::fsio::append_line;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogLine {
    init_id: String,
    ts: DateTime<Utc>,
    op: LogOp,
}

#[derive(Debug, Clone)]
struct Lineage {
    log: DatasetLog,
    deleted: bool,
}

#[derive(Debug, Default)]
struct BookState {
    lineages: Vec<Lineage>,
}

impl BookState {
    fn live(&self, username: &str, name: &str) -> Option<&Lineage> {
        self.lineages
            .iter()
            .rev()
            .find(|l| !l.deleted && l.log.username == username && l.log.name == name)
    }

    fn by_id_mut(&mut self, init_id: &str) -> Result<&mut Lineage> {
        self.lineages
            .iter_mut()
            .find(|l| l.log.init_id == init_id && !l.deleted)
            .ok_or_else(|| RepoError::NotFound(format!("logbook: initID {init_id}")))
    }

    fn apply(&mut self, line: LogLine) -> Result<()> {
        match line.op {
            LogOp::Init {
                username,
                profile_id,
                name,
            } => {
                self.lineages.push(Lineage {
                    log: DatasetLog {
                        init_id: line.init_id,
                        username,
                        profile_id,
                        name,
                        versions: Vec::new(),
                    },
                    deleted: false,
                });
            }
            LogOp::Version(v) => self.by_id_mut(&line.init_id)?.log.versions.push(v),
            LogOp::DeleteVersions { count } => {
                let versions = &mut self.by_id_mut(&line.init_id)?.log.versions;
                let keep = versions.len().saturating_sub(count);
                versions.truncate(keep);
            }
            LogOp::DeleteDataset => self.by_id_mut(&line.init_id)?.deleted = true,
        }
        Ok(())
    }
}

pub struct Book {
    file: Option<PathBuf>,
    state: Mutex<BookState>,
    diag: Diagnostics,
}

impl Book {
    /// Replay `file` (if present) into memory. Lines that do not parse or do
    /// not apply are logged and skipped.
    pub fn open(file: impl Into<PathBuf>, diag: Diagnostics) -> Result<Self> {
        let file = file.into();
        let mut state = BookState::default();
        if file.exists() {
            let text = fs::read_to_string(&file)?;
            for (n, raw) in text.lines().enumerate() {
                if raw.trim().is_empty() {
                    continue;
                }
                let line: LogLine = match serde_json::from_str(raw) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(parent: diag.span(), line = n + 1, error = %e, "skipping unreadable logbook line");
                        continue;
                    }
                };
                if let Err(e) = state.apply(line) {
                    tracing::warn!(parent: diag.span(), line = n + 1, error = %e, "skipping logbook op");
                }
            }
            if !text.is_empty() && !text.ends_with('\n') {
                // torn final write; end it so the next append starts a fresh line
                append_line(&file, "")?;
            }
            tracing::debug!(parent: diag.span(), lineages = state.lineages.len(), "logbook loaded");
        }
        Ok(Self {
            file: Some(file),
            state: Mutex::new(state),
            diag,
        })
    }

    pub fn in_memory(diag: Diagnostics) -> Self {
        Self {
            file: None,
            state: Mutex::new(BookState::default()),
            diag,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BookState) -> Result<T>) -> Result<T> {
        let mut st = self
            .state
            .lock()
            .map_err(|_| RepoError::Store("logbook lock poisoned".to_string()))?;
        f(&mut st)
    }

    /// Append then apply, so the file never lags the in-memory view.
    fn write(&self, st: &mut BookState, init_id: &str, op: LogOp) -> Result<()> {
        let line = LogLine {
            init_id: init_id.to_string(),
            ts: Utc::now(),
            op,
        };
        if let Some(file) = &self.file {
            append_line(file, &serde_json::to_string(&line)?)?;
        }
        st.apply(line)
    }
}

impl Logbook for Book {
    fn ref_to_init_id(&self, r: &Ref) -> Result<String> {
        self.with_state(|st| {
            st.live(&r.username, &r.name)
                .map(|l| l.log.init_id.clone())
                .ok_or_else(|| RepoError::NotFound(r.alias()))
        })
    }

    fn write_dataset_init(&self, username: &str, profile_id: &str, name: &str) -> Result<String> {
        let init_id = mint_init_id(profile_id, name);
        self.with_state(|st| {
            self.write(
                st,
                &init_id,
                LogOp::Init {
                    username: username.to_string(),
                    profile_id: profile_id.to_string(),
                    name: name.to_string(),
                },
            )
        })?;
        tracing::debug!(parent: self.diag.span(), %init_id, %username, %name, "logbook init");
        Ok(init_id)
    }

    fn write_version_save(&self, init_id: &str, ds: &Dataset) -> Result<()> {
        if ds.path.is_empty() {
            return Err(RepoError::Validation("logbook: version has no path".to_string()));
        }
        self.with_state(|st| {
            st.by_id_mut(init_id)?;
            self.write(st, init_id, LogOp::Version(VersionEntry::from_dataset(ds)))
        })
    }

    fn write_version_delete(&self, init_id: &str, count: usize) -> Result<()> {
        self.with_state(|st| {
            st.by_id_mut(init_id)?;
            self.write(st, init_id, LogOp::DeleteVersions { count })
        })
    }

    fn write_dataset_delete(&self, init_id: &str) -> Result<()> {
        self.with_state(|st| {
            st.by_id_mut(init_id)?;
            self.write(st, init_id, LogOp::DeleteDataset)
        })
    }

    fn items(&self, r: &Ref, offset: usize, limit: Option<usize>) -> Result<Vec<DatasetLogItem>> {
        self.with_state(|st| {
            let lineage = st
                .live(&r.username, &r.name)
                .ok_or_else(|| RepoError::NotFound(r.alias()))?;
            let log = &lineage.log;
            let items: Vec<DatasetLogItem> = log
                .versions
                .iter()
                .rev()
                .skip(offset)
                .take(limit.unwrap_or(usize::MAX))
                .map(|v| DatasetLogItem {
                    username: log.username.clone(),
                    profile_id: log.profile_id.clone(),
                    name: log.name.clone(),
                    path: v.path.clone(),
                    timestamp: Some(v.timestamp),
                    body_size: v.body_size,
                    body_rows: v.body_rows,
                    num_errors: v.num_errors,
                    ..Default::default()
                })
                .collect();
            if items.is_empty() {
                return Err(RepoError::NoHistory);
            }
            Ok(items)
        })
    }

    fn construct_dataset_log(&self, r: &Ref, history: &[Dataset]) -> Result<()> {
        if history.is_empty() {
            return Err(RepoError::NoHistory);
        }
        if self.has_entries(r)? {
            return Err(RepoError::Store(format!("logbook: log already exists for {}", r.alias())));
        }
        let init_id = self.write_dataset_init(&r.username, &r.profile_id, &r.name)?;
        for ds in history.iter().rev() {
            self.write_version_save(&init_id, ds)?;
        }
        tracing::info!(parent: self.diag.span(), dataset = %r.alias(), versions = history.len(), "constructed logbook from history");
        Ok(())
    }

    fn dataset_logs(&self) -> Result<Vec<DatasetLog>> {
        self.with_state(|st| {
            Ok(st
                .lineages
                .iter()
                .filter(|l| !l.deleted)
                .map(|l| l.log.clone())
                .collect())
        })
    }
}
