use std::fmt;

use thiserror::Error;

use crate::io::document::DocumentError;
use crate::io::store::StoreError;

/// An entry caught in a dependency cycle, identified for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleMember {
    pub position: usize,
    pub description: String,
}

impl fmt::Display for CycleMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} \"{}\"", self.position + 1, self.description)
    }
}

/// Errors that abort a synchronization pass.
///
/// Per-line and per-region problems are not errors; they are reported as
/// [`crate::warnings::Warning`]s.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("dependency cycle between {}", join_members(.entries))]
    DependencyCycle { entries: Vec<CycleMember> },

    #[error("index coherence violated: {0}")]
    Coherence(String),

    #[error("identifier {prefix} is ambiguous in source {store}: {}", .candidates.join(", "))]
    AmbiguousIdentifier {
        prefix: String,
        store: String,
        candidates: Vec<String>,
    },

    #[error("undefined context @{0}")]
    UndefinedContext(String),

    #[error("unknown source {0}")]
    UnknownSource(String),

    #[error("cache is stale, reset it before further use")]
    Stale,

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),
}

impl ReconcileError {
    /// Whether the cache can no longer be trusted after this error
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ReconcileError::Coherence(_) | ReconcileError::Stale | ReconcileError::Document(_)
        )
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Ambiguous {
                prefix,
                store,
                candidates,
            } => ReconcileError::AmbiguousIdentifier {
                prefix,
                store,
                candidates,
            },
            StoreError::UnknownSource(key) => ReconcileError::UnknownSource(key),
            StoreError::UnknownContext(name) => ReconcileError::UndefinedContext(name),
            other => ReconcileError::Store(other),
        }
    }
}

fn join_members(entries: &[CycleMember]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
