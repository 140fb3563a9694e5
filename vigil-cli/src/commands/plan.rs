//! `vigil plan`: the start order `vigil run` would use.

use anyhow::{Context, Result};
use clap::Args;

use vigil_daemon::plan_at;

/// Arguments for `vigil plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let plan = plan_at(&home).context("failed to resolve start order")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("failed to render plan JSON")?
            );
            return Ok(());
        }

        for (step, service) in plan.iter().enumerate() {
            let deps = if service.depends_on.is_empty() {
                String::new()
            } else {
                let names: Vec<&str> = service.depends_on.iter().map(|d| d.as_str()).collect();
                format!(" <- {}", names.join(", "))
            };
            println!(
                "{:>2}. {} [{}, {}]{}",
                step + 1,
                service.id,
                service.category,
                service.priority,
                deps
            );
        }
        Ok(())
    }
}
