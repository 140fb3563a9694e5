//! Error types for vigil-reconcile.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::CollectionId;

/// Errors raised by the stores and sources the reconciler talks to.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be read or written.
    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Collection ids double as file names and must stay inside the store.
    #[error("collection id '{0}' cannot be used as a file name")]
    InvalidCollection(CollectionId),

    /// The source of truth could not answer.
    #[error("source of truth error: {0}")]
    Source(String),
}

/// Convenience constructor for [`ReconcileError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReconcileError {
    ReconcileError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`ReconcileError::Json`].
pub(crate) fn json_err(path: impl Into<PathBuf>, source: serde_json::Error) -> ReconcileError {
    ReconcileError::Json {
        path: path.into(),
        source,
    }
}
