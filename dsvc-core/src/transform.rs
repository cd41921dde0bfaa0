// src/transform.rs
//! Hook for running a dataset's transform script during a save.
//!
//! The interpreter lives elsewhere. The save pipeline hands it the merged
//! snapshot, the previous head and a `MutateCheck` listing the components this
//! save is already changing; the runner must consult it before touching a
//! component and fail if the check does.

use std::collections::HashMap;
use std::io::Write;

use crate::dataset::Dataset;
use crate::error::{RepoError, Result};

pub type Secrets = HashMap<String, String>;

/// Components a transform may write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutateCheck {
    allowed: Vec<&'static str>,
}

impl MutateCheck {
    pub fn new(allowed: Vec<&'static str>) -> Self {
        Self { allowed }
    }

    pub fn allows(&self, component: &str) -> bool {
        self.allowed.iter().any(|c| *c == component)
    }

    pub fn check(&self, component: &str) -> Result<()> {
        if self.allows(component) {
            Ok(())
        } else {
            Err(RepoError::Transform(format!(
                "transform may not modify {component}: it is not part of this save"
            )))
        }
    }
}

pub trait TransformRunner: Send + Sync {
    /// Run the script attached to `ds`, mutating it in place. Script output
    /// and diagnostics go to `err_sink`.
    fn exec(
        &self,
        ds: &mut Dataset,
        prev: Option<&Dataset>,
        check: &MutateCheck,
        secrets: &Secrets,
        err_sink: &mut dyn Write,
    ) -> anyhow::Result<()>;
}
