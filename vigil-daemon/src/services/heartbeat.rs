//! Built-in `heartbeat` service.
//!
//! Keeps `heartbeat.json` fresh while the daemon runs and writes a final
//! timestamp on stop, so the next boot measures downtime from the last moment
//! the process was known to be alive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use vigil_core::{HookError, Priority, ServiceCategory, ServiceDescriptor, ServiceHooks};
use vigil_reconcile::HeartbeatFile;

pub const HEARTBEAT_SERVICE: &str = "heartbeat";

struct Refresher {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct HeartbeatService {
    file: HeartbeatFile,
    interval: Option<Duration>,
    last_write_ok: Arc<AtomicBool>,
    refresher: Mutex<Option<Refresher>>,
}

impl HeartbeatService {
    /// `interval: None` disables the periodic refresh; the final write on
    /// stop still happens.
    pub fn new(file: HeartbeatFile, interval: Option<Duration>) -> Self {
        Self {
            file,
            interval,
            last_write_ok: Arc::new(AtomicBool::new(true)),
            refresher: Mutex::new(None),
        }
    }

    pub fn descriptor(self: Arc<Self>) -> ServiceDescriptor {
        ServiceDescriptor::from_shared(HEARTBEAT_SERVICE, self)
            .with_category(ServiceCategory::Maintenance)
            .with_priority(Priority::High)
    }

    fn refresher(&self) -> MutexGuard<'_, Option<Refresher>> {
        self.refresher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_now(file: &HeartbeatFile, ok: &AtomicBool) -> Result<(), HookError> {
        match file.write(Utc::now()) {
            Ok(()) => {
                ok.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                ok.store(false, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }
}

impl ServiceHooks for HeartbeatService {
    fn start(&self) -> Result<(), HookError> {
        let Some(period) = self.interval else {
            tracing::debug!("heartbeat refresh disabled");
            return Ok(());
        };
        let handle = Handle::try_current()?;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let file = self.file.clone();
        let ok = self.last_write_ok.clone();

        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Boot already wrote a heartbeat; skip the immediate tick.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let file = file.clone();
                        let ok = ok.clone();
                        let written = tokio::task::spawn_blocking(move || {
                            HeartbeatService::write_now(&file, &ok)
                        })
                        .await;
                        match written {
                            Ok(Ok(())) => tracing::trace!("heartbeat refreshed"),
                            Ok(Err(e)) => tracing::warn!(error = %e, "heartbeat refresh failed"),
                            Err(e) => tracing::warn!(error = %e, "heartbeat refresh task failed"),
                        }
                    }
                }
            }
        });

        *self.refresher() = Some(Refresher { stop_tx, task });
        tracing::debug!(interval_secs = period.as_secs(), "heartbeat refresh started");
        Ok(())
    }

    fn stop(&self) -> Result<(), HookError> {
        if let Some(refresher) = self.refresher().take() {
            // The task may already be gone if the runtime is shutting down.
            let _ = refresher.stop_tx.send(());
        }
        Self::write_now(&self.file, &self.last_write_ok)?;
        tracing::info!("final heartbeat written");
        Ok(())
    }

    fn check_health(&self) -> bool {
        if !self.last_write_ok.load(Ordering::Relaxed) {
            return false;
        }
        match self.refresher().as_ref() {
            Some(refresher) => !refresher.task.is_finished(),
            None => self.interval.is_none(),
        }
    }
}
