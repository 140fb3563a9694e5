//! `vigil status`: live service states from the running daemon.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use tabled::{settings::Style, Table, Tabled};

use vigil_core::{ServiceState, ServiceStatus};
use vigil_daemon::{request_status, DaemonError, StatusPayload};
use vigil_reconcile::downtime::format_duration;

/// Arguments for `vigil status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "service")]
    id: String,
    #[tabled(rename = "category")]
    category: String,
    #[tabled(rename = "priority")]
    priority: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "health")]
    health: String,
    #[tabled(rename = "since")]
    since: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;

        let status = match request_status(&home) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { socket }) => {
                if self.json {
                    let payload = json!({
                        "running": false,
                        "socket": socket.display().to_string(),
                    });
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&payload)
                            .context("failed to render status JSON")?
                    );
                } else {
                    println!("vigil is not running (no socket at {})", socket.display());
                }
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query vigil status"),
        };

        if self.json {
            let mut payload = serde_json::to_value(&status).context("failed to render status JSON")?;
            payload["running"] = json!(true);
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
            );
            return Ok(());
        }

        print_table(&status);
        Ok(())
    }
}

fn print_table(status: &StatusPayload) {
    let uptime = (Utc::now() - status.started_at).to_std().unwrap_or_default();
    let unhealthy = status.services.iter().filter(|s| !s.healthy).count();
    println!(
        "Vigil v{} | pid {} | up {} | {} services | {}",
        env!("CARGO_PKG_VERSION"),
        status.pid,
        format_duration(uptime),
        status.services.len(),
        if unhealthy == 0 {
            "all healthy".green().to_string()
        } else {
            format!("{unhealthy} unhealthy").red().bold().to_string()
        },
    );

    if status.services.is_empty() {
        println!("No services registered.");
        return;
    }

    let rows: Vec<StatusTableRow> = status.services.iter().map(table_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for service in status.services.iter().filter(|s| s.last_error.is_some()) {
        if let Some(error) = &service.last_error {
            println!("{} {}: {}", "■".red().bold(), service.id, error);
        }
    }
}

fn table_row(service: &ServiceStatus) -> StatusTableRow {
    let age = (Utc::now() - service.since).to_std().unwrap_or_default();
    StatusTableRow {
        id: service.id.to_string(),
        category: service.category.to_string(),
        priority: service.priority.to_string(),
        state: state_label(service.state).to_string(),
        health: health_label(service).to_string(),
        since: format!("{} ago", format_duration(age)),
    }
}

fn state_label(state: ServiceState) -> &'static str {
    match state {
        ServiceState::Registered => "REGISTERED",
        ServiceState::Starting => "STARTING",
        ServiceState::Running => "RUNNING",
        ServiceState::Stopping => "STOPPING",
        ServiceState::Stopped => "STOPPED",
        ServiceState::Failed => "FAILED",
    }
}

fn health_label(service: &ServiceStatus) -> &'static str {
    match (service.state, service.healthy) {
        (_, true) => "healthy",
        (ServiceState::Running, false) => "UNHEALTHY",
        (_, false) => "-",
    }
}
