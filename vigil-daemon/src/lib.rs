//! Vigil daemon: boot reconciliation, built-in services, control socket.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod services;

pub use error::DaemonError;
pub use protocol::{
    request_health, request_status, request_stop, send_request, ControlRequest, ControlResponse,
    StatusPayload,
};
pub use runtime::{init_tracing, run, start_blocking};
pub use services::{build_registry, plan, plan_at, DaemonServices, PlannedService};
