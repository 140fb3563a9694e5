//! Ordered start and bounded stop of registered services.
//!
//! One thread of control drives both paths and hooks run one at a time.
//!
//! - **Start**: resolve the order (structural errors abort before any hook
//!   runs), then start each service. The first failure halts the pass.
//!   Services that already reached `Running` stay running; rolling them back
//!   is the caller's decision.
//! - **Stop**: walk the realized start order backwards. Every stop hook runs
//!   on its own worker thread and the orchestrator waits at most for what is
//!   left of the overall deadline, so a hung hook is abandoned and reported
//!   as [`StopFailure::ShutdownTimeout`] instead of blocking shutdown.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::{HookError, HookTimeout, LifecycleError, StopFailure};
use crate::registry::ServiceRegistry;
use crate::service::{ServiceDescriptor, ServiceHooks};
use crate::types::{ServiceId, ServiceState};

/// Runtime companion of a registered descriptor.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    descriptor: ServiceDescriptor,
    state: ServiceState,
    last_error: Option<String>,
    changed_at: DateTime<Utc>,
}

impl ServiceRecord {
    fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            state: ServiceState::Registered,
            last_error: None,
            changed_at: Utc::now(),
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// When the record last changed state.
    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Start,
    Stop,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Stop => "stop",
        }
    }

    fn invoke(self, hooks: &dyn ServiceHooks) -> Result<(), HookError> {
        match self {
            Phase::Start => hooks.start(),
            Phase::Stop => hooks.stop(),
        }
    }
}

/// Budget for each stop hook reached after the overall deadline has passed.
/// Keeps one hung service from turning every later stop into a timeout while
/// bounding the overrun to this much per remaining service.
const LATE_STOP_GRACE: Duration = Duration::from_millis(50);

enum HookOutcome {
    Returned(Result<(), HookError>),
    TimedOut,
}

/// Drives the lifecycle of every service in a [`ServiceRegistry`].
#[derive(Debug)]
pub struct LifecycleOrchestrator {
    registry: ServiceRegistry,
    records: HashMap<ServiceId, ServiceRecord>,
    started: Vec<ServiceId>,
    start_attempted: bool,
}

impl LifecycleOrchestrator {
    /// Take ownership of a fully populated registry.
    pub fn new(registry: ServiceRegistry) -> Self {
        let records = registry
            .iter()
            .map(|d| (d.id().clone(), ServiceRecord::new(d.clone())))
            .collect();
        Self {
            registry,
            records,
            started: Vec::new(),
            start_attempted: false,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn record(&self, id: &ServiceId) -> Option<&ServiceRecord> {
        self.records.get(id)
    }

    pub fn state(&self, id: &ServiceId) -> Option<ServiceState> {
        self.records.get(id).map(ServiceRecord::state)
    }

    /// Services that reached `Running` and have not been stopped yet, in the
    /// order they started.
    pub fn started(&self) -> &[ServiceId] {
        &self.started
    }

    /// Resolve the start order and start every service in it.
    ///
    /// Blocks until every service is running or one has failed. On failure
    /// the failing record is `Failed`, nothing after it is attempted, and
    /// services started earlier remain `Running`.
    pub fn start_all(&mut self) -> Result<(), LifecycleError> {
        if self.start_attempted {
            return Err(LifecycleError::AlreadyStarted);
        }
        let order = self.registry.resolve_start_order()?;
        self.start_attempted = true;

        tracing::info!(
            services = order.len(),
            order = %join_ids(&order),
            "starting services",
        );

        for id in order {
            let Some((hooks, timeout)) = self
                .records
                .get(&id)
                .map(|r| (r.descriptor.hooks().clone(), r.descriptor.start_timeout()))
            else {
                continue;
            };

            self.transition(&id, ServiceState::Starting, None);
            let began = Instant::now();
            let outcome = match timeout {
                Some(budget) => call_with_budget(&id, Phase::Start, hooks, budget),
                None => HookOutcome::Returned(run_hook(&id, Phase::Start, hooks.as_ref())),
            };
            let source = match outcome {
                HookOutcome::Returned(Ok(())) => {
                    self.transition(&id, ServiceState::Running, None);
                    self.started.push(id.clone());
                    tracing::info!(
                        service = %id,
                        elapsed_ms = began.elapsed().as_millis() as u64,
                        "service started",
                    );
                    continue;
                }
                HookOutcome::Returned(Err(source)) => source,
                HookOutcome::TimedOut => {
                    Box::new(HookTimeout(timeout.unwrap_or_default())) as HookError
                }
            };

            self.transition(&id, ServiceState::Failed, Some(source.to_string()));
            tracing::error!(
                service = %id,
                error = %source,
                running = self.started.len(),
                "service failed to start; halting start sequence",
            );
            return Err(LifecycleError::StartFailure {
                service: id,
                source,
            });
        }

        tracing::info!(services = self.started.len(), "all services started");
        Ok(())
    }

    /// Stop every started service in reverse start order within `deadline`.
    ///
    /// Never short-circuits: each service gets its stop signal even when an
    /// earlier one failed or hung. All failures come back together as
    /// [`LifecycleError::Shutdown`].
    pub fn stop_all(&mut self, deadline: Duration) -> Result<(), LifecycleError> {
        let due = Instant::now().checked_add(deadline);
        let order: Vec<ServiceId> = self.started.drain(..).rev().collect();
        let mut failures = Vec::new();

        tracing::info!(
            services = order.len(),
            deadline_ms = deadline.as_millis() as u64,
            order = %join_ids(&order),
            "stopping services",
        );

        for id in order {
            let Some(hooks) = self.records.get(&id).map(|r| r.descriptor.hooks().clone()) else {
                continue;
            };
            let budget = due
                .map(|due| due.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::MAX)
                .max(LATE_STOP_GRACE);

            self.transition(&id, ServiceState::Stopping, None);
            match call_with_budget(&id, Phase::Stop, hooks, budget) {
                HookOutcome::Returned(Ok(())) => {
                    self.transition(&id, ServiceState::Stopped, None);
                    tracing::info!(service = %id, "service stopped");
                }
                HookOutcome::Returned(Err(source)) => {
                    tracing::warn!(service = %id, error = %source, "service failed to stop");
                    self.transition(&id, ServiceState::Failed, Some(source.to_string()));
                    failures.push(StopFailure::Failed { service: id, source });
                }
                HookOutcome::TimedOut => {
                    tracing::warn!(
                        service = %id,
                        budget_ms = budget.as_millis() as u64,
                        "service did not stop before the shutdown deadline; moving on",
                    );
                    let failure = StopFailure::ShutdownTimeout { service: id.clone() };
                    self.transition(&id, ServiceState::Failed, Some(failure.to_string()));
                    failures.push(failure);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Shutdown { failures })
        }
    }

    fn transition(&mut self, id: &ServiceId, state: ServiceState, error: Option<String>) {
        if let Some(record) = self.records.get_mut(id) {
            tracing::debug!(service = %id, from = %record.state, to = %state, "state change");
            record.state = state;
            if error.is_some() {
                record.last_error = error;
            }
            record.changed_at = Utc::now();
        }
    }

    pub(crate) fn records_in_registration_order(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.registry
            .iter()
            .filter_map(|d| self.records.get(d.id()))
    }
}

/// Run one hook on a worker thread and wait at most `budget` for it.
///
/// A hook that outlives its budget keeps running detached. If an abandoned
/// start hook eventually succeeds, the same thread runs the stop hook, since
/// the service never entered the started list.
fn call_with_budget(
    id: &ServiceId,
    phase: Phase,
    hooks: Arc<dyn ServiceHooks>,
    budget: Duration,
) -> HookOutcome {
    // Rendezvous: a send only succeeds while the caller is still waiting.
    let (tx, rx) = mpsc::sync_channel(0);
    let hook_id = id.clone();
    let spawned = thread::Builder::new()
        .name(format!("vigil-{}-{id}", phase.label()))
        .spawn(move || {
            let result = run_hook(&hook_id, phase, hooks.as_ref());
            let succeeded = result.is_ok();
            if tx.send(result).is_err() && succeeded && matches!(phase, Phase::Start) {
                tracing::warn!(
                    service = %hook_id,
                    "start hook returned after its timeout; stopping the service",
                );
                if let Err(err) = run_hook(&hook_id, Phase::Stop, hooks.as_ref()) {
                    tracing::warn!(service = %hook_id, error = %err, "late stop failed");
                }
            }
        });
    if let Err(err) = spawned {
        return HookOutcome::Returned(Err(Box::new(err)));
    }

    match rx.recv_timeout(budget) {
        Ok(result) => HookOutcome::Returned(result),
        Err(RecvTimeoutError::Timeout) => HookOutcome::TimedOut,
        Err(RecvTimeoutError::Disconnected) => HookOutcome::Returned(Err(format!(
            "{} hook for '{id}' exited without reporting a result",
            phase.label()
        )
        .into())),
    }
}

/// Invoke a hook, turning a panic into an ordinary hook error.
fn run_hook(id: &ServiceId, phase: Phase, hooks: &dyn ServiceHooks) -> Result<(), HookError> {
    panic::catch_unwind(AssertUnwindSafe(|| phase.invoke(hooks))).unwrap_or_else(|payload| {
        Err(format!(
            "{} hook for '{id}' panicked: {}",
            phase.label(),
            panic_message(payload.as_ref())
        )
        .into())
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn join_ids(ids: &[ServiceId]) -> String {
    ids.iter()
        .map(ServiceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn logging(id: &'static str, log: &Arc<Mutex<Vec<String>>>) -> ServiceDescriptor {
        let start_log = log.clone();
        let stop_log = log.clone();
        ServiceDescriptor::from_fns(
            id,
            move || {
                start_log.lock().unwrap().push(format!("start:{id}"));
                Ok(())
            },
            move || {
                stop_log.lock().unwrap().push(format!("stop:{id}"));
                Ok(())
            },
            || true,
        )
    }

    #[test]
    fn records_start_registered() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ServiceRegistry::new();
        reg.register(logging("a", &log)).unwrap();
        let orch = LifecycleOrchestrator::new(reg);
        assert_eq!(orch.state(&"a".into()), Some(ServiceState::Registered));
        assert!(orch.state(&"missing".into()).is_none());
    }

    #[test]
    fn start_then_stop_walks_both_directions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ServiceRegistry::new();
        reg.register(logging("api", &log).depends_on("db")).unwrap();
        reg.register(logging("db", &log)).unwrap();
        let mut orch = LifecycleOrchestrator::new(reg);

        orch.start_all().expect("start");
        assert_eq!(orch.started(), &[ServiceId::from("db"), ServiceId::from("api")]);
        orch.stop_all(Duration::from_secs(5)).expect("stop");

        assert_eq!(
            *log.lock().unwrap(),
            ["start:db", "start:api", "stop:api", "stop:db"]
        );
        assert_eq!(orch.state(&"db".into()), Some(ServiceState::Stopped));
        assert!(orch.started().is_empty());
    }

    #[test]
    fn second_start_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ServiceRegistry::new();
        reg.register(logging("a", &log)).unwrap();
        let mut orch = LifecycleOrchestrator::new(reg);
        orch.start_all().expect("start");
        assert!(matches!(orch.start_all(), Err(LifecycleError::AlreadyStarted)));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn start_timeout_marks_service_failed() {
        let mut reg = ServiceRegistry::new();
        reg.register(
            ServiceDescriptor::from_fns(
                "slow",
                || {
                    thread::sleep(Duration::from_millis(500));
                    Ok(())
                },
                || Ok(()),
                || true,
            )
            .with_start_timeout(Duration::from_millis(20)),
        )
        .unwrap();
        let mut orch = LifecycleOrchestrator::new(reg);

        match orch.start_all().unwrap_err() {
            LifecycleError::StartFailure { service, source } => {
                assert_eq!(service.as_str(), "slow");
                assert!(source.to_string().contains("did not return"));
            }
            other => panic!("expected start failure, got {other:?}"),
        }
        assert_eq!(orch.state(&"slow".into()), Some(ServiceState::Failed));
        assert!(orch.started().is_empty());
    }

    #[test]
    fn panicking_stop_hook_is_reported_not_propagated() {
        let mut reg = ServiceRegistry::new();
        reg.register(ServiceDescriptor::from_fns(
            "crashy",
            || Ok(()),
            || panic!("stop blew up"),
            || true,
        ))
        .unwrap();
        let mut orch = LifecycleOrchestrator::new(reg);
        orch.start_all().expect("start");

        match orch.stop_all(Duration::from_secs(5)).unwrap_err() {
            LifecycleError::Shutdown { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].to_string().contains("panicked"));
            }
            other => panic!("expected shutdown error, got {other:?}"),
        }
    }
}
