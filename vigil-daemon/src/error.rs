use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, built-in services, and the control
/// protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] vigil_core::ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] vigil_core::LifecycleError),

    #[error("store error: {0}")]
    Store(#[from] vigil_reconcile::ReconcileError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} task join failure: {1}")]
    Join(&'static str, String),

    #[error("control protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
