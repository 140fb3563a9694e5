//! Built-in `control` service: the Unix socket behind `vigil status` and
//! `vigil stop`.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::{UnixListener as StdUnixListener, UnixStream as StdUnixStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;
use vigil_core::{
    HookError, LifecycleOrchestrator, Priority, ServiceCategory, ServiceDescriptor, ServiceHooks,
    ServiceId,
};

use crate::error::{io_err, DaemonError};
use crate::protocol::{ControlRequest, ControlResponse, StatusPayload};
use crate::services::heartbeat::HEARTBEAT_SERVICE;

pub const CONTROL_SERVICE: &str = "control";

pub type SharedOrchestrator = Arc<RwLock<LifecycleOrchestrator>>;

struct Listener {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// What a connection handler needs; cloned into every client task.
#[derive(Clone)]
struct Context {
    orchestrator: Weak<RwLock<LifecycleOrchestrator>>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: DateTime<Utc>,
}

pub struct ControlService {
    socket: PathBuf,
    shutdown_tx: broadcast::Sender<()>,
    started_at: DateTime<Utc>,
    orchestrator: OnceLock<Weak<RwLock<LifecycleOrchestrator>>>,
    listener: Mutex<Option<Listener>>,
}

impl ControlService {
    /// `shutdown_tx` is the daemon-wide shutdown signal fired by `stop`.
    pub fn new(socket: impl Into<PathBuf>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            socket: socket.into(),
            shutdown_tx,
            started_at: Utc::now(),
            orchestrator: OnceLock::new(),
            listener: Mutex::new(None),
        }
    }

    pub fn descriptor(self: Arc<Self>) -> ServiceDescriptor {
        ServiceDescriptor::from_shared(CONTROL_SERVICE, self)
            .with_category(ServiceCategory::Control)
            .with_priority(Priority::Low)
            .depends_on(HEARTBEAT_SERVICE)
    }

    /// Give the service read access to the orchestrator that owns it. Held
    /// weakly: the orchestrator owns this service's descriptor.
    pub fn attach(&self, orchestrator: &SharedOrchestrator) {
        if self.orchestrator.set(Arc::downgrade(orchestrator)).is_err() {
            tracing::warn!("control service already attached");
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    fn listener(&self) -> MutexGuard<'_, Option<Listener>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn context(&self) -> Context {
        Context {
            orchestrator: self.orchestrator.get().cloned().unwrap_or_default(),
            shutdown_tx: self.shutdown_tx.clone(),
            started_at: self.started_at,
        }
    }
}

impl ServiceHooks for ControlService {
    fn start(&self) -> Result<(), HookError> {
        let handle = Handle::try_current()?;
        prepare_socket_for_bind(&self.socket)?;

        // Bind synchronously so a bind failure is a start failure.
        let std_listener =
            StdUnixListener::bind(&self.socket).map_err(|e| io_err(&self.socket, e))?;
        set_socket_permissions(&self.socket)?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| io_err(&self.socket, e))?;
        let listener = {
            let _entered = handle.enter();
            UnixListener::from_std(std_listener).map_err(|e| io_err(&self.socket, e))?
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = handle.spawn(serve(
            listener,
            self.socket.clone(),
            self.context(),
            stop_rx,
        ));
        *self.listener() = Some(Listener { stop_tx, task });
        tracing::info!(socket = %self.socket.display(), "control socket listening");
        Ok(())
    }

    fn stop(&self) -> Result<(), HookError> {
        if let Some(listener) = self.listener().take() {
            let _ = listener.stop_tx.send(());
        }
        match fs::remove_file(&self.socket) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&self.socket, e).into()),
        }
    }

    fn check_health(&self) -> bool {
        self.listener()
            .as_ref()
            .is_some_and(|listener| !listener.task.is_finished())
    }
}

async fn serve(
    listener: UnixListener,
    socket: PathBuf,
    context: Context,
    mut stop_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(err) => {
                        tracing::error!(socket = %socket.display(), error = %err, "control socket accept failed");
                        break;
                    }
                };
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, context).await {
                        tracing::warn!(error = %err, "control client error");
                    }
                });
            }
        }
    }
    tracing::debug!("control socket closed");
}

async fn handle_client(stream: UnixStream, context: Context) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("control socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: ControlRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &ControlResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = respond(&context, &request).await;
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }
    Ok(())
}

async fn respond(context: &Context, request: &ControlRequest) -> ControlResponse {
    match request.cmd.as_str() {
        "status" => {
            let Some(orchestrator) = context.orchestrator.upgrade() else {
                return ControlResponse::error("orchestrator is not available");
            };
            let services = orchestrator.read().await.health_report();
            let payload = StatusPayload {
                pid: std::process::id(),
                started_at: context.started_at,
                services,
            };
            match serde_json::to_value(payload) {
                Ok(data) => ControlResponse::ok(data),
                Err(err) => ControlResponse::error(err.to_string()),
            }
        }
        "health" => {
            let Some(service) = request.service.as_deref() else {
                return ControlResponse::error("'health' needs a 'service' field");
            };
            let Some(orchestrator) = context.orchestrator.upgrade() else {
                return ControlResponse::error("orchestrator is not available");
            };
            let status = orchestrator.read().await.status(&ServiceId::from(service));
            match status.map(serde_json::to_value) {
                Some(Ok(data)) => ControlResponse::ok(data),
                Some(Err(err)) => ControlResponse::error(err.to_string()),
                None => ControlResponse::error(format!("unknown service '{service}'")),
            }
        }
        "stop" => {
            tracing::info!("stop requested over control socket");
            let _ = context.shutdown_tx.send(());
            ControlResponse::ok(json!({ "stopping": true }))
        }
        other => ControlResponse::error(format!("unknown command '{other}'")),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &ControlResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("control socket flush", e))?;
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "control socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale control socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use vigil_core::{ServiceRegistry, ServiceState};

    use crate::protocol::send_request;

    fn orchestrator_with(control: &Arc<ControlService>) -> SharedOrchestrator {
        let mut registry = ServiceRegistry::new();
        registry
            .register(ServiceDescriptor::from_fns(
                HEARTBEAT_SERVICE,
                || Ok(()),
                || Ok(()),
                || true,
            ))
            .unwrap();
        registry.register(control.clone().descriptor()).unwrap();
        let shared = Arc::new(RwLock::new(LifecycleOrchestrator::new(registry)));
        control.attach(&shared);
        shared
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serves_status_health_and_stop() {
        let home = TempDir::new().unwrap();
        let socket = crate::paths::socket_path(home.path());
        fs::create_dir_all(socket.parent().unwrap()).unwrap();
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(4);
        let control = Arc::new(ControlService::new(&socket, shutdown_tx));
        let orchestrator = orchestrator_with(&control);

        let starter = orchestrator.clone();
        tokio::task::spawn_blocking(move || starter.blocking_write().start_all())
            .await
            .unwrap()
            .unwrap();
        assert!(control.check_health());

        let client_home = home.path().to_path_buf();
        let status = tokio::task::spawn_blocking(move || {
            crate::protocol::request_status(&client_home)
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(status.pid, std::process::id());
        let ids: Vec<&str> = status.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["heartbeat", "control"]);
        assert!(status
            .services
            .iter()
            .all(|s| s.state == ServiceState::Running && s.healthy));

        let client_home = home.path().to_path_buf();
        let unknown = tokio::task::spawn_blocking(move || {
            crate::protocol::request_health(&client_home, "nope")
        })
        .await
        .unwrap();
        assert!(unknown.unwrap_err().to_string().contains("unknown service"));

        let client_home = home.path().to_path_buf();
        let response = tokio::task::spawn_blocking(move || {
            send_request(&client_home, &ControlRequest::new("stop"))
        })
        .await
        .unwrap()
        .unwrap();
        assert!(response.ok);
        tokio::time::timeout(Duration::from_secs(2), shutdown_rx.recv())
            .await
            .expect("shutdown signal")
            .unwrap();

        let stopper = orchestrator.clone();
        tokio::task::spawn_blocking(move || stopper.blocking_write().stop_all(Duration::from_secs(2)))
            .await
            .unwrap()
            .unwrap();
        assert!(!socket.exists());
        assert!(!control.check_health());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn live_socket_is_not_stolen() {
        let home = TempDir::new().unwrap();
        let socket = home.path().join("vigil.sock");
        let _held = StdUnixListener::bind(&socket).unwrap();
        let (shutdown_tx, _) = broadcast::channel(1);
        let control = ControlService::new(&socket, shutdown_tx);

        let err = control.start().unwrap_err();
        assert!(err.to_string().contains("already in use"), "got: {err}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_socket_file_is_replaced() {
        let home = TempDir::new().unwrap();
        let socket = home.path().join("vigil.sock");
        drop(StdUnixListener::bind(&socket).unwrap());
        assert!(socket.exists());
        let (shutdown_tx, _) = broadcast::channel(1);
        let control = ControlService::new(&socket, shutdown_tx);

        control.start().unwrap();
        assert!(control.check_health());
        control.stop().unwrap();
    }
}
