//! `failstorm status` command handler

use std::io::Write;

use serde::Serialize;
use tracing::debug;

use failstorm_core::config::FailstormConfig;
use failstorm_core::types::{HealthState, LifecycleState, ManagedInstance, Role};

use crate::cli::StatusArgs;
use crate::commands::connect_controller;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `status` command.
pub async fn execute(
    args: StatusArgs,
    config: &FailstormConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let role = args
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()
        .map_err(CliError::Command)?;

    let mut controller = connect_controller(config)?;
    controller.check_control().await?;
    let snapshot = controller.status_all().await?;
    debug!(instances = snapshot.len(), "observed managed instances");

    writer.render(&StatusReport::new(snapshot, role))?;
    Ok(())
}

#[derive(Serialize)]
pub struct StatusReport {
    pub instances: Vec<InstanceStatus>,
}

#[derive(Serialize)]
pub struct InstanceStatus {
    pub name: String,
    pub role: Role,
    pub lifecycle: LifecycleState,
    pub health: HealthState,
}

impl StatusReport {
    fn new(snapshot: Vec<ManagedInstance>, role: Option<Role>) -> Self {
        let instances = snapshot
            .into_iter()
            .filter(|inst| role.is_none_or(|r| inst.role == r))
            .map(|inst| InstanceStatus {
                name: inst.name,
                role: inst.role,
                lifecycle: inst.lifecycle,
                health: inst.health,
            })
            .collect();
        Self { instances }
    }
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{:<32} {:<16} {:<10} Health", "Instance", "Role", "State")?;
        writeln!(w, "{}", "-".repeat(70))?;

        for inst in &self.instances {
            let lifecycle = inst.lifecycle.to_string();
            let lifecycle = match inst.lifecycle {
                LifecycleState::Running => lifecycle.green(),
                LifecycleState::Stopped => lifecycle.red(),
                LifecycleState::Starting | LifecycleState::Stopping => lifecycle.yellow(),
                LifecycleState::Unknown => lifecycle.dimmed(),
            };
            let health = inst.health.to_string();
            let health = match inst.health {
                HealthState::Healthy => health.green(),
                HealthState::Unhealthy => health.red(),
                HealthState::Unknown => health.dimmed(),
            };
            writeln!(
                w,
                "{:<32} {:<16} {:<10} {}",
                inst.name,
                inst.role.as_str(),
                lifecycle,
                health
            )?;
        }

        if self.instances.is_empty() {
            writeln!(w, "{}", "no managed instances".dimmed())?;
        }
        Ok(())
    }
}
