//! Service descriptors and the lifecycle hook capability.
//!
//! A service is anything implementing [`ServiceHooks`]. Services with real
//! per-variant state implement the trait directly; thin wrappers around an
//! existing component can use [`ServiceDescriptor::from_fns`] instead.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::HookError;
use crate::types::{Priority, ServiceCategory, ServiceId};

/// Lifecycle hooks of a managed service.
///
/// Hooks take `&self` and must be `Send + Sync`: the orchestrator may run a
/// stop hook (or a start hook with a timeout) on a worker thread so it can
/// abandon it when the budget runs out. Services keep their mutable state
/// behind interior mutability.
pub trait ServiceHooks: Send + Sync {
    /// Bring the service up. Returning `Ok` means the service is running.
    fn start(&self) -> Result<(), HookError>;

    /// Signal the service to stop and release what it holds.
    fn stop(&self) -> Result<(), HookError>;

    /// Report current health. Must not block and must not have side effects
    /// visible to the caller.
    fn check_health(&self) -> bool;
}

/// [`ServiceHooks`] built from three closures.
pub struct FnHooks<S, T, H> {
    start: S,
    stop: T,
    health: H,
}

impl<S, T, H> FnHooks<S, T, H>
where
    S: Fn() -> Result<(), HookError> + Send + Sync,
    T: Fn() -> Result<(), HookError> + Send + Sync,
    H: Fn() -> bool + Send + Sync,
{
    pub fn new(start: S, stop: T, health: H) -> Self {
        Self {
            start,
            stop,
            health,
        }
    }
}

impl<S, T, H> ServiceHooks for FnHooks<S, T, H>
where
    S: Fn() -> Result<(), HookError> + Send + Sync,
    T: Fn() -> Result<(), HookError> + Send + Sync,
    H: Fn() -> bool + Send + Sync,
{
    fn start(&self) -> Result<(), HookError> {
        (self.start)()
    }

    fn stop(&self) -> Result<(), HookError> {
        (self.stop)()
    }

    fn check_health(&self) -> bool {
        (self.health)()
    }
}

/// Immutable description of one manageable service.
///
/// Built with the `with_*` / [`depends_on`](Self::depends_on) builder
/// methods, then handed to [`ServiceRegistry::register`](crate::ServiceRegistry::register),
/// after which it is only readable.
#[derive(Clone)]
pub struct ServiceDescriptor {
    id: ServiceId,
    category: ServiceCategory,
    priority: Priority,
    dependencies: Vec<ServiceId>,
    start_timeout: Option<Duration>,
    hooks: Arc<dyn ServiceHooks>,
}

impl ServiceDescriptor {
    pub fn new(id: impl Into<ServiceId>, hooks: impl ServiceHooks + 'static) -> Self {
        Self::from_shared(id, Arc::new(hooks))
    }

    /// Descriptor around hooks the caller keeps a handle to.
    pub fn from_shared(id: impl Into<ServiceId>, hooks: Arc<dyn ServiceHooks>) -> Self {
        Self {
            id: id.into(),
            category: ServiceCategory::default(),
            priority: Priority::default(),
            dependencies: Vec::new(),
            start_timeout: None,
            hooks,
        }
    }

    /// Descriptor holding three function values.
    pub fn from_fns<S, T, H>(id: impl Into<ServiceId>, start: S, stop: T, health: H) -> Self
    where
        S: Fn() -> Result<(), HookError> + Send + Sync + 'static,
        T: Fn() -> Result<(), HookError> + Send + Sync + 'static,
        H: Fn() -> bool + Send + Sync + 'static,
    {
        Self::new(id, FnHooks::new(start, stop, health))
    }

    pub fn with_category(mut self, category: ServiceCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Declare a dependency. Repeated declarations are ignored; declaration
    /// order is kept because cycle reporting walks dependencies in it.
    pub fn depends_on(mut self, dependency: impl Into<ServiceId>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Bound how long the start hook may run before it counts as failed.
    /// Without this the orchestrator waits for the hook indefinitely.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    pub fn category(&self) -> ServiceCategory {
        self.category
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn dependencies(&self) -> &[ServiceId] {
        &self.dependencies
    }

    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout
    }

    pub(crate) fn hooks(&self) -> &Arc<dyn ServiceHooks> {
        &self.hooks
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .field("start_timeout", &self.start_timeout)
            .finish_non_exhaustive()
    }
}
