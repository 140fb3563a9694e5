//! `vigil stop`: graceful shutdown over the control socket.

use anyhow::{Context, Result};
use vigil_daemon::{request_stop, DaemonError};

pub fn run() -> Result<()> {
    let home = super::home()?;
    match request_stop(&home) {
        Ok(()) => println!("vigil stop requested"),
        Err(DaemonError::DaemonNotRunning { .. }) => println!("vigil is not running"),
        Err(err) => return Err(err).context("failed to stop vigil"),
    }
    Ok(())
}
