//! Issue taxonomy shared by generation and merge reports.
//!
//! Engine internals propagate `anyhow::Error`; whenever a failure is confined
//! to one document or one unit it is caught at that boundary and recorded as an
//! [`Issue`] so the rest of the batch keeps going.

use std::fmt;

use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum IssueKind {
    /// Missing or unreadable source document, malformed markup, missing topic.
    #[error("input error")]
    Input,

    /// A unit no longer fits the document it came from.
    #[error("structural mismatch")]
    StructuralMismatch,

    /// A unit has no target.
    #[error("missing target")]
    MissingTarget,

    /// Two merges disagree on a non-profiling attribute of the same reference.
    #[error("reconciliation conflict")]
    ReconciliationConflict,

    /// Writing output (topic, map, asset) failed.
    #[error("output error")]
    Output,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    /// Root-relative document path, or the container path for container-wide issues.
    pub document: String,
    pub unit: Option<usize>,
    pub message: String,
    /// False when the engine fell back (e.g. kept source text) and carried on.
    pub fatal: bool,
}

impl Issue {
    pub fn fatal(kind: IssueKind, document: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            document: document.into(),
            unit: None,
            message: message.into(),
            fatal: true,
        }
    }

    pub fn warning(kind: IssueKind, document: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fatal: false,
            ..Self::fatal(kind, document, message)
        }
    }

    pub fn with_unit(mut self, unit: usize) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Builds a fatal issue from an error chain, keeping every context layer.
    pub fn from_error(kind: IssueKind, document: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::fatal(kind, document, format!("{err:#}"))
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = if self.fatal { "error" } else { "warning" };
        write!(f, "{level}: {} in {}", self.kind, self.document)?;
        if let Some(u) = self.unit {
            write!(f, " (unit {u})")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Raised by a strict merge when a document had to be rejected.
#[derive(Error, Debug)]
#[error("{count} document(s) failed: {summary}")]
pub struct BatchFailed {
    pub count: usize,
    pub summary: String,
}

impl BatchFailed {
    pub fn from_issues(issues: &[Issue]) -> Option<Self> {
        let fatal: Vec<&Issue> = issues.iter().filter(|i| i.fatal).collect();
        if fatal.is_empty() {
            return None;
        }
        let mut docs: Vec<&str> = fatal.iter().map(|i| i.document.as_str()).collect();
        docs.sort_unstable();
        docs.dedup();
        Some(Self {
            count: docs.len(),
            summary: docs.join(", "),
        })
    }
}
