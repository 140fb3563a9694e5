//! Health query surface of the orchestrator.
//!
//! Health is pulled, never polled: each query calls the service's
//! `check_health` hook synchronously, and only while the service is
//! `Running`. No timeout is imposed on the hook; a hook that blocks stalls
//! the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{LifecycleOrchestrator, ServiceRecord};
use crate::types::{Priority, ServiceCategory, ServiceId, ServiceState};

/// Point-in-time view of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub id: ServiceId,
    pub category: ServiceCategory,
    pub priority: Priority,
    pub state: ServiceState,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ServiceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub since: DateTime<Utc>,
}

impl LifecycleOrchestrator {
    /// Current health of `id`. False for unknown services and for services
    /// that are not `Running`; the hook is not invoked in either case.
    pub fn health(&self, id: &ServiceId) -> bool {
        self.record(id).map(probe).unwrap_or(false)
    }

    /// Snapshot of one service.
    pub fn status(&self, id: &ServiceId) -> Option<ServiceStatus> {
        self.record(id).map(snapshot)
    }

    /// Snapshot of every service, in registration order.
    pub fn health_report(&self) -> Vec<ServiceStatus> {
        self.records_in_registration_order().map(snapshot).collect()
    }
}

fn probe(record: &ServiceRecord) -> bool {
    record.state() == ServiceState::Running && record.descriptor().hooks().check_health()
}

fn snapshot(record: &ServiceRecord) -> ServiceStatus {
    let descriptor = record.descriptor();
    ServiceStatus {
        id: descriptor.id().clone(),
        category: descriptor.category(),
        priority: descriptor.priority(),
        state: record.state(),
        healthy: probe(record),
        dependencies: descriptor.dependencies().to_vec(),
        last_error: record.last_error().map(str::to_owned),
        since: record.changed_at(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::{ServiceDescriptor, ServiceRegistry};

    #[test]
    fn hook_not_called_unless_running() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut reg = ServiceRegistry::new();
        reg.register(ServiceDescriptor::from_fns(
            "monitoring",
            || Ok(()),
            || Ok(()),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            },
        ))
        .unwrap();
        let mut orch = LifecycleOrchestrator::new(reg);
        let id = ServiceId::from("monitoring");

        assert!(!orch.health(&id));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        orch.start_all().unwrap();
        assert!(orch.health(&id));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        orch.stop_all(std::time::Duration::from_secs(1)).unwrap();
        assert!(!orch.health(&id));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn report_reflects_hook_answer() {
        let healthy = Arc::new(AtomicBool::new(true));
        let flag = healthy.clone();
        let mut reg = ServiceRegistry::new();
        reg.register(ServiceDescriptor::from_fns(
            "automod",
            || Ok(()),
            || Ok(()),
            move || flag.load(Ordering::SeqCst),
        ))
        .unwrap();
        let mut orch = LifecycleOrchestrator::new(reg);
        orch.start_all().unwrap();

        assert!(orch.health_report()[0].healthy);
        healthy.store(false, Ordering::SeqCst);
        let report = orch.health_report();
        assert_eq!(report[0].state, ServiceState::Running);
        assert!(!report[0].healthy);
    }

    #[test]
    fn unknown_service_is_unhealthy() {
        let orch = LifecycleOrchestrator::new(ServiceRegistry::new());
        assert!(!orch.health(&"ghost".into()));
        assert!(orch.status(&"ghost".into()).is_none());
        assert!(orch.health_report().is_empty());
    }
}
