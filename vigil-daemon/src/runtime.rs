use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use vigil_core::{Config, LifecycleError, LifecycleOrchestrator, LogConfig, LogFormat};
use vigil_reconcile::{reconcile, DirectorySource, FileStore, ReconcileReport};

use crate::error::{io_err, DaemonError};
use crate::paths::{source_dir_at, vigil_root};
use crate::services::{build_registry, SharedOrchestrator};

/// How long runtime teardown waits for lingering blocking tasks.
const RUNTIME_TEARDOWN: Duration = Duration::from_millis(500);

/// Load config, start the runtime, and block the current thread until the
/// daemon exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    let config = vigil_core::config::load_at(home)?;
    init_tracing(&config.log);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let result = runtime.block_on(run(home.to_path_buf(), config));
    // Stop hooks that outlived the deadline must not hold the process open.
    runtime.shutdown_timeout(RUNTIME_TEARDOWN);
    result
}

/// Boot, serve until ctrl-c or a control-socket `stop`, then shut down.
///
/// Reconciliation runs before any service is registered. The store is closed
/// only after every stop hook was attempted.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let store = FileStore::open_at(&home)?;

    let (store, report) = {
        let home = home.clone();
        let threshold = config.stale_threshold();
        tokio::task::spawn_blocking(move || reconcile_at_boot(&home, threshold, store))
            .await
            .map_err(|err| DaemonError::Join("reconcile", err.to_string()))?
    };
    log_report(&report);

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let services = build_registry(&config, &home, shutdown_tx.clone())?;
    let orchestrator: SharedOrchestrator =
        Arc::new(RwLock::new(LifecycleOrchestrator::new(services.registry)));
    if let Some(control) = &services.control {
        control.attach(&orchestrator);
    }

    // Subscribe before starting so a `stop` sent during boot is not missed.
    let mut shutdown_rx = shutdown_tx.subscribe();

    let started = {
        let orchestrator = orchestrator.clone();
        tokio::task::spawn_blocking(move || orchestrator.blocking_write().start_all())
            .await
            .map_err(|err| DaemonError::Join("start", err.to_string()))
            .and_then(|started| started.map_err(DaemonError::from))
    };
    if let Err(err) = started {
        tracing::error!(error = %err, "boot failed; stopping services that did start");
        if let Err(stop_err) = stop_services(&orchestrator, config.shutdown_deadline()).await {
            tracing::error!(error = %stop_err, "could not run the stop sequence");
        }
        close_store(store);
        return Err(err);
    }

    tracing::info!(pid = std::process::id(), "vigil running");
    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutdown requested"),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => tracing::info!("received ctrl-c, shutting down"),
            Err(err) => tracing::error!(error = %err, "ctrl-c handler failed, shutting down"),
        },
    }

    let stopped = stop_services(&orchestrator, config.shutdown_deadline()).await;
    close_store(store);
    tracing::info!("vigil stopped");
    stopped
}

fn reconcile_at_boot(
    home: &Path,
    threshold: Duration,
    mut store: FileStore,
) -> (FileStore, ReconcileReport) {
    let source = DirectorySource::open_at(home);
    let report = reconcile(
        Utc::now(),
        threshold,
        &source,
        &mut store.heartbeat,
        &mut store.cache,
    );
    (store, report)
}

fn log_report(report: &ReconcileReport) {
    tracing::info!(
        downtime = %report.downtime.describe(),
        resynced = report.resynced,
        collections = report.collections,
        members = report.members,
        changed = report.changed,
        unchanged = report.unchanged,
        heartbeat_written = report.heartbeat_written,
        "boot reconciliation",
    );
    for failure in &report.failures {
        tracing::warn!(error = %failure, "reconciliation step skipped");
    }
}

/// Stop everything that started. Stop failures are logged, never returned;
/// only a failure to run the stop sequence at all is an error.
async fn stop_services(
    orchestrator: &SharedOrchestrator,
    deadline: Duration,
) -> Result<(), DaemonError> {
    let orchestrator = orchestrator.clone();
    let stopped = tokio::task::spawn_blocking(move || orchestrator.blocking_write().stop_all(deadline))
        .await
        .map_err(|err| DaemonError::Join("stop", err.to_string()))?;

    match stopped {
        Ok(()) => tracing::info!("all services stopped cleanly"),
        Err(LifecycleError::Shutdown { failures }) => {
            for failure in &failures {
                tracing::error!(service = %failure.service(), error = %failure, "stop failure");
            }
            tracing::error!(failed = failures.len(), "shutdown finished with failures");
        }
        Err(err) => tracing::error!(error = %err, "shutdown failed"),
    }
    Ok(())
}

fn close_store(store: FileStore) {
    if let Err(err) = store.close() {
        tracing::error!(error = %err, "closing store failed");
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [vigil_root(home), source_dir_at(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides the configured filter.
pub fn init_tracing(log: &LogConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match log.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
