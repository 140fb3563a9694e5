//! Stop-path tests: reverse ordering, failure aggregation, deadline handling.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use vigil_core::{
    LifecycleError, LifecycleOrchestrator, ServiceDescriptor, ServiceRegistry, ServiceState,
    StopFailure,
};

type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Copy)]
enum StopBehavior {
    Clean,
    Fails,
    Hangs,
}

fn svc(id: &str, log: &CallLog, stop: StopBehavior) -> ServiceDescriptor {
    let start_log = log.clone();
    let stop_log = log.clone();
    let start_id = id.to_string();
    let stop_id = id.to_string();
    ServiceDescriptor::from_fns(
        id,
        move || {
            start_log.lock().unwrap().push(format!("start:{start_id}"));
            Ok(())
        },
        move || {
            stop_log.lock().unwrap().push(format!("stop:{stop_id}"));
            match stop {
                StopBehavior::Clean => Ok(()),
                StopBehavior::Fails => Err(format!("{stop_id} flush failed").into()),
                StopBehavior::Hangs => loop {
                    thread::park();
                },
            }
        },
        || true,
    )
}

fn failing_start(id: &str, log: &CallLog) -> ServiceDescriptor {
    let start_log = log.clone();
    let start_id = id.to_string();
    ServiceDescriptor::from_fns(
        id,
        move || {
            start_log.lock().unwrap().push(format!("start:{start_id}"));
            Err("gateway unreachable".into())
        },
        || Ok(()),
        || true,
    )
}

fn entries(log: &CallLog, prefix: &str) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
        .collect()
}

fn reversed(mut v: Vec<String>) -> Vec<String> {
    v.reverse();
    v
}

// ---------------------------------------------------------------------------
// 1. Ordering
// ---------------------------------------------------------------------------

#[test]
fn stop_order_reverses_full_start_order() {
    let log: CallLog = Arc::default();
    let mut reg = ServiceRegistry::new();
    reg.register(svc("automod", &log, StopBehavior::Clean).depends_on("monitoring"))
        .unwrap();
    reg.register(svc("monitoring", &log, StopBehavior::Clean).depends_on("store"))
        .unwrap();
    reg.register(svc("store", &log, StopBehavior::Clean)).unwrap();
    reg.register(svc("commands", &log, StopBehavior::Clean)).unwrap();
    let mut orch = LifecycleOrchestrator::new(reg);

    orch.start_all().expect("start");
    orch.stop_all(Duration::from_secs(5)).expect("stop");

    let started = entries(&log, "start:");
    assert_eq!(entries(&log, "stop:"), reversed(started));
}

#[test]
fn stop_order_reverses_partial_start_and_skips_unstarted() {
    let log: CallLog = Arc::default();
    let mut reg = ServiceRegistry::new();
    reg.register(svc("store", &log, StopBehavior::Clean)).unwrap();
    reg.register(svc("cache", &log, StopBehavior::Clean).depends_on("store"))
        .unwrap();
    reg.register(failing_start("gateway", &log).depends_on("cache"))
        .unwrap();
    reg.register(svc("automod", &log, StopBehavior::Clean).depends_on("gateway"))
        .unwrap();
    let mut orch = LifecycleOrchestrator::new(reg);

    assert!(matches!(
        orch.start_all(),
        Err(LifecycleError::StartFailure { .. })
    ));
    orch.stop_all(Duration::from_secs(5)).expect("stop");

    assert_eq!(entries(&log, "stop:"), ["cache", "store"]);
    assert_eq!(orch.state(&"gateway".into()), Some(ServiceState::Failed));
    assert_eq!(orch.state(&"automod".into()), Some(ServiceState::Registered));
    assert_eq!(orch.state(&"store".into()), Some(ServiceState::Stopped));
}

#[test]
fn stop_without_start_is_a_no_op() {
    let log: CallLog = Arc::default();
    let mut reg = ServiceRegistry::new();
    reg.register(svc("store", &log, StopBehavior::Clean)).unwrap();
    let mut orch = LifecycleOrchestrator::new(reg);

    orch.stop_all(Duration::from_secs(1)).expect("stop");
    assert!(log.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// 2. Aggregation
// ---------------------------------------------------------------------------

#[test]
fn every_service_is_signalled_and_every_failure_reported() {
    let log: CallLog = Arc::default();
    let mut reg = ServiceRegistry::new();
    reg.register(svc("a", &log, StopBehavior::Fails)).unwrap();
    reg.register(svc("b", &log, StopBehavior::Clean).depends_on("a"))
        .unwrap();
    reg.register(svc("c", &log, StopBehavior::Fails).depends_on("b"))
        .unwrap();
    let mut orch = LifecycleOrchestrator::new(reg);
    orch.start_all().expect("start");

    let err = orch.stop_all(Duration::from_secs(5)).unwrap_err();
    assert_eq!(entries(&log, "stop:"), ["c", "b", "a"]);

    let LifecycleError::Shutdown { failures } = &err else {
        panic!("expected shutdown error, got {err:?}");
    };
    let failed: Vec<&str> = failures.iter().map(|f| f.service().as_str()).collect();
    assert_eq!(failed, ["c", "a"]);
    assert!(failures.iter().all(|f| !f.is_timeout()));

    let msg = err.to_string();
    assert!(msg.contains("c flush failed"), "got: {msg}");
    assert!(msg.contains("a flush failed"), "got: {msg}");
    assert_eq!(orch.state(&"b".into()), Some(ServiceState::Stopped));
    assert_eq!(orch.state(&"a".into()), Some(ServiceState::Failed));
}

// ---------------------------------------------------------------------------
// 3. Deadline
// ---------------------------------------------------------------------------

#[test]
fn hung_stop_hook_is_abandoned_at_the_deadline() {
    let log: CallLog = Arc::default();
    let mut reg = ServiceRegistry::new();
    reg.register(svc("store", &log, StopBehavior::Clean)).unwrap();
    reg.register(svc("monitoring", &log, StopBehavior::Hangs).depends_on("store"))
        .unwrap();
    reg.register(svc("automod", &log, StopBehavior::Clean).depends_on("monitoring"))
        .unwrap();
    let mut orch = LifecycleOrchestrator::new(reg);
    orch.start_all().expect("start");

    let deadline = Duration::from_millis(300);
    let began = Instant::now();
    let err = orch.stop_all(deadline).unwrap_err();
    let elapsed = began.elapsed();

    assert!(
        elapsed < deadline + Duration::from_millis(700),
        "stop_all took {elapsed:?} with a {deadline:?} deadline"
    );

    let LifecycleError::Shutdown { failures } = err else {
        panic!("expected shutdown error");
    };
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        StopFailure::ShutdownTimeout { service } if service.as_str() == "monitoring"
    ));

    // Services after the hung one in stop order still got their stop signal.
    let stopped = entries(&log, "stop:");
    assert_eq!(stopped[0], "automod");
    assert!(stopped.contains(&"monitoring".to_string()));
    assert_eq!(orch.state(&"monitoring".into()), Some(ServiceState::Failed));
    assert_eq!(orch.state(&"automod".into()), Some(ServiceState::Stopped));
}

#[test]
fn exhausted_deadline_still_signals_remaining_services() {
    let log: CallLog = Arc::default();
    let mut reg = ServiceRegistry::new();
    reg.register(svc("first", &log, StopBehavior::Clean)).unwrap();
    reg.register(svc("second", &log, StopBehavior::Hangs).depends_on("first"))
        .unwrap();
    let mut orch = LifecycleOrchestrator::new(reg);
    orch.start_all().expect("start");

    let err = orch.stop_all(Duration::from_millis(100)).unwrap_err();
    let LifecycleError::Shutdown { failures } = err else {
        panic!("expected shutdown error");
    };
    assert!(failures[0].is_timeout());
    assert_eq!(failures[0].service().as_str(), "second");

    // `first` is stopped on its own worker with no budget left; give it a
    // moment to record the call.
    let waited = Instant::now();
    while !entries(&log, "stop:").contains(&"first".to_string())
        && waited.elapsed() < Duration::from_secs(2)
    {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(entries(&log, "stop:").contains(&"first".to_string()));
}
