//! Vigil core library: service descriptors, registry, lifecycle orchestration.
//!
//! - [`types`]: identities, priorities, run states
//! - [`service`]: [`ServiceHooks`] and [`ServiceDescriptor`]
//! - [`registry`]: registration and start-order resolution
//! - [`orchestrator`]: ordered start, bounded stop
//! - [`health`]: on-demand health queries
//! - [`config`]: `~/.vigil/config.yaml`
//! - [`error`]: [`LifecycleError`], [`StopFailure`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod types;

pub use config::{Config, LogConfig, LogFormat, ServiceConfig};
pub use error::{ConfigError, HookError, HookTimeout, LifecycleError, StopFailure};
pub use health::ServiceStatus;
pub use orchestrator::{LifecycleOrchestrator, ServiceRecord};
pub use registry::ServiceRegistry;
pub use service::{FnHooks, ServiceDescriptor, ServiceHooks};
pub use types::{Priority, ServiceCategory, ServiceId, ServiceState};
