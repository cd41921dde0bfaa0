// src/utils/diag.rs
use std::path::Path;

/// Diagnostic sink handed to each component at construction. Events are
/// emitted with `parent: diag.span()` so subscribers can tell repos apart.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    span: tracing::Span,
}

impl Diagnostics {
    pub fn for_root(root: &Path) -> Self {
        Self {
            span: tracing::info_span!("dsvc", root = %root.display()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            span: tracing::info_span!("dsvc", root = "mem"),
        }
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}
