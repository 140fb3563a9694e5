//! Newline-delimited JSON over the control socket.
//!
//! One request per line, one response per line:
//!
//! ```text
//! {"cmd":"status"}
//! {"cmd":"health","service":"monitoring"}
//! {"cmd":"stop"}
//! ```

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vigil_core::ServiceStatus;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl ControlRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            service: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Payload of a `status` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub services: Vec<ServiceStatus>,
}

/// Send one request to the control socket and read one response.
pub fn send_request(home: &Path, request: &ControlRequest) -> Result<ControlResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    Ok(serde_json::from_str(line.trim_end())?)
}

pub fn request_status(home: &Path) -> Result<StatusPayload, DaemonError> {
    let data = response_into_data(send_request(home, &ControlRequest::new("status"))?)?;
    Ok(serde_json::from_value(data)?)
}

pub fn request_health(home: &Path, service: &str) -> Result<ServiceStatus, DaemonError> {
    let request = ControlRequest {
        cmd: "health".to_string(),
        service: Some(service.to_string()),
    };
    let data = response_into_data(send_request(home, &request)?)?;
    Ok(serde_json::from_value(data)?)
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    response_into_data(send_request(home, &ControlRequest::new("stop"))?).map(|_| ())
}

fn response_into_data(response: ControlResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_socket_means_not_running() {
        let home = TempDir::new().unwrap();
        let err = request_status(home.path()).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
    }

    #[test]
    fn request_omits_absent_service() {
        let encoded = serde_json::to_string(&ControlRequest::new("stop")).unwrap();
        assert_eq!(encoded, r#"{"cmd":"stop"}"#);

        let decoded: ControlRequest =
            serde_json::from_str(r#"{"cmd":"health","service":"automod"}"#).unwrap();
        assert_eq!(decoded.service.as_deref(), Some("automod"));
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = response_into_data(ControlResponse::error("unknown service 'x'")).unwrap_err();
        assert_eq!(err.to_string(), "control protocol error: unknown service 'x'");
    }
}
