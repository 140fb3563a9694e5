//! Child processes declared under `services:` in the config.

use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};

use vigil_core::{HookError, ServiceConfig, ServiceDescriptor, ServiceHooks};

pub struct ProcessService {
    config: ServiceConfig,
    child: Mutex<Option<Child>>,
}

impl ProcessService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
        }
    }

    /// Descriptor carrying the config's ordering metadata.
    pub fn descriptor(config: ServiceConfig) -> ServiceDescriptor {
        let id = config.id.clone();
        let category = config.category;
        let priority = config.priority;
        let start_timeout = config.start_timeout();
        let depends_on = config.depends_on.clone();

        let mut descriptor = ServiceDescriptor::new(id, ProcessService::new(config))
            .with_category(category)
            .with_priority(priority);
        for dependency in depends_on {
            descriptor = descriptor.depends_on(dependency);
        }
        if let Some(timeout) = start_timeout {
            descriptor = descriptor.with_start_timeout(timeout);
        }
        descriptor
    }

    fn slot(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pid(&self) -> Option<u32> {
        self.slot().as_ref().map(Child::id)
    }
}

impl ServiceHooks for ProcessService {
    fn start(&self) -> Result<(), HookError> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(format!("'{}' already has a running child", self.config.id).into());
        }
        let child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| format!("spawning {}: {e}", self.config.command.display()))?;
        tracing::info!(service = %self.config.id, pid = child.id(), "child spawned");
        *slot = Some(child);
        Ok(())
    }

    fn stop(&self) -> Result<(), HookError> {
        let Some(mut child) = self.slot().take() else {
            return Ok(());
        };
        if let Some(status) = child.try_wait()? {
            tracing::warn!(service = %self.config.id, %status, "child had already exited");
            return Ok(());
        }
        child.kill()?;
        let status = child.wait()?;
        tracing::info!(service = %self.config.id, %status, "child stopped");
        Ok(())
    }

    fn check_health(&self) -> bool {
        match self.slot().as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                tracing::debug!(service = %self.config.id, %status, "child exited");
                false
            }
            Some(Err(e)) => {
                tracing::warn!(service = %self.config.id, error = %e, "could not poll child");
                false
            }
            None => false,
        }
    }
}
