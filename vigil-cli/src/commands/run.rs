//! `vigil run`: the daemon in the foreground.

use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let home = super::home()?;
    vigil_daemon::start_blocking(&home).context("vigil exited with error")
}
