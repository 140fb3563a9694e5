//! `vigil heartbeat`: last-seen timestamp and the resync decision it implies.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde_json::json;

use vigil_reconcile::{classify, Downtime, HeartbeatFile, HeartbeatStore};

/// Arguments for `vigil heartbeat`.
#[derive(Args, Debug)]
pub struct HeartbeatArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl HeartbeatArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let config = vigil_core::config::load_at(&home).context("failed to load config")?;
        let file = HeartbeatFile::open_at(&home);
        let last = file
            .last_heartbeat()
            .with_context(|| format!("failed to read {}", file.path().display()))?;
        let threshold = config.stale_threshold();
        let downtime = classify(Utc::now(), last, threshold);

        if self.json {
            let payload = json!({
                "path": file.path().display().to_string(),
                "last_seen": last.map(|at| at.to_rfc3339()),
                "offline_secs": downtime.offline().map(|d| d.as_secs()),
                "threshold_secs": threshold.as_secs(),
                "requires_resync": downtime.requires_resync(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render heartbeat JSON")?
            );
            return Ok(());
        }

        match last {
            Some(at) => println!("last heartbeat: {}", at.to_rfc3339()),
            None => println!("last heartbeat: never"),
        }
        let label = match &downtime {
            Downtime::Recent { .. } => downtime.describe().green(),
            Downtime::Stale { .. } | Downtime::NeverSeen => downtime.describe().yellow(),
            Downtime::Unknown { .. } => downtime.describe().red(),
        };
        println!("status: {label}");
        if downtime.requires_resync() {
            println!("The next `vigil run` will resynchronize the cache.");
        }
        Ok(())
    }
}
