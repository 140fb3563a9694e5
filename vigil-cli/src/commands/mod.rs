pub mod heartbeat;
pub mod plan;
pub mod run;
pub mod status;
pub mod stop;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) fn home() -> Result<PathBuf> {
    vigil_core::config::home().context("could not determine home directory")
}
