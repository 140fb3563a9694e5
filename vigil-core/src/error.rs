//! Error types for vigil-core.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ServiceId;

/// Error returned by a service's start or stop hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cause recorded when a hook is abandoned because its time budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("hook did not return within {0:?}")]
pub struct HookTimeout(pub Duration);

/// Errors from registration, dependency resolution, and start/stop sequencing.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A descriptor with the same identity is already registered.
    #[error("service '{0}' is already registered")]
    DuplicateIdentity(ServiceId),

    /// A declared dependency is not registered at resolution time.
    #[error("service '{service}' depends on unregistered service '{missing}'")]
    UnknownDependency { service: ServiceId, missing: ServiceId },

    /// The dependency graph contains a cycle. `path` starts and ends with the
    /// same identity, e.g. `[y, z, y]`.
    #[error("dependency cycle detected: {}", CyclePath(path))]
    CyclicDependency { path: Vec<ServiceId> },

    /// A start hook failed or timed out; later services were not started.
    #[error("service '{service}' failed to start: {source}")]
    StartFailure {
        service: ServiceId,
        #[source]
        source: HookError,
    },

    /// `start_all` was called on an orchestrator that already ran a start pass.
    #[error("start_all already ran for this orchestrator")]
    AlreadyStarted,

    /// One or more services failed to stop cleanly.
    #[error("{} service(s) failed to stop cleanly: {}", failures.len(), StopSummary(failures))]
    Shutdown { failures: Vec<StopFailure> },
}

/// A single failure collected during `stop_all`.
#[derive(Debug, Error)]
pub enum StopFailure {
    /// The stop hook was still running when the shutdown deadline elapsed.
    #[error("service '{service}' did not stop within the shutdown deadline")]
    ShutdownTimeout { service: ServiceId },

    /// The stop hook returned an error.
    #[error("service '{service}' failed to stop: {source}")]
    Failed {
        service: ServiceId,
        #[source]
        source: HookError,
    },
}

impl StopFailure {
    pub fn service(&self) -> &ServiceId {
        match self {
            StopFailure::ShutdownTimeout { service } | StopFailure::Failed { service, .. } => {
                service
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StopFailure::ShutdownTimeout { .. })
    }
}

/// Errors from loading `config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with file path and serde_yaml line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The file parsed but describes an unusable setup.
    #[error("invalid config at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

struct CyclePath<'a>(&'a [ServiceId]);

impl fmt::Display for CyclePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            id.fmt(f)?;
        }
        Ok(())
    }
}

struct StopSummary<'a>(&'a [StopFailure]);

impl fmt::Display for StopSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            failure.fmt(f)?;
        }
        Ok(())
    }
}
