//! Services the daemon registers: the built-ins plus one per configured child
//! process.

pub mod control;
pub mod heartbeat;
pub mod process;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use vigil_core::{Config, Priority, ServiceCategory, ServiceId, ServiceRegistry};
use vigil_reconcile::HeartbeatFile;

use crate::error::DaemonError;
use crate::paths::socket_path;

pub use control::{ControlService, SharedOrchestrator, CONTROL_SERVICE};
pub use heartbeat::{HeartbeatService, HEARTBEAT_SERVICE};
pub use process::ProcessService;

/// A populated registry and the handle the runtime must attach to the
/// orchestrator once it exists.
pub struct DaemonServices {
    pub registry: ServiceRegistry,
    pub control: Option<Arc<ControlService>>,
}

/// Register the built-in services, then the configured child processes.
///
/// Construction has no side effects: nothing is spawned or bound until the
/// orchestrator calls the start hooks.
pub fn build_registry(
    config: &Config,
    home: &Path,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<DaemonServices, DaemonError> {
    let mut registry = ServiceRegistry::new();

    let heartbeat = Arc::new(HeartbeatService::new(
        HeartbeatFile::open_at(home),
        config.heartbeat_interval(),
    ));
    registry.register(heartbeat.descriptor())?;

    let control = if config.control_socket {
        let control = Arc::new(ControlService::new(socket_path(home), shutdown_tx));
        registry.register(control.clone().descriptor())?;
        Some(control)
    } else {
        None
    };

    for service in &config.services {
        registry.register(ProcessService::descriptor(service.clone()))?;
    }

    Ok(DaemonServices { registry, control })
}

/// One entry of a resolved start plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedService {
    pub id: ServiceId,
    pub category: ServiceCategory,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ServiceId>,
}

/// Resolved start order of the configured services, without starting any.
pub fn plan_at(home: &Path) -> Result<Vec<PlannedService>, DaemonError> {
    let config = vigil_core::config::load_at(home)?;
    plan(&config, home)
}

pub fn plan(config: &Config, home: &Path) -> Result<Vec<PlannedService>, DaemonError> {
    let (shutdown_tx, _) = broadcast::channel(1);
    let DaemonServices { registry, .. } = build_registry(config, home, shutdown_tx)?;
    let order = registry.resolve_start_order()?;
    Ok(order
        .iter()
        .filter_map(|id| registry.get(id))
        .map(|descriptor| PlannedService {
            id: descriptor.id().clone(),
            category: descriptor.category(),
            priority: descriptor.priority(),
            depends_on: descriptor.dependencies().to_vec(),
        })
        .collect())
}
