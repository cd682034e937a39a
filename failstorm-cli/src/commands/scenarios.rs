//! `failstorm scenarios` command handler

use std::io::Write;

use serde::Serialize;

use failstorm_core::types::Expectation;
use failstorm_scenario::{BUILTIN_SCENARIOS, ScenarioDefinition, builtin};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `scenarios` command.
///
/// `both_down` is the configured expectation for phases with every query
/// worker stopped; it is shown as it would be applied by `failstorm run`.
pub fn execute(both_down: Expectation, writer: &OutputWriter) -> Result<(), CliError> {
    writer.render(&ScenarioCatalog::new(both_down))?;
    Ok(())
}

#[derive(Serialize)]
pub struct ScenarioCatalog {
    pub scenarios: Vec<ScenarioDefinition>,
}

impl ScenarioCatalog {
    fn new(both_down: Expectation) -> Self {
        let scenarios = BUILTIN_SCENARIOS
            .iter()
            .filter_map(|name| builtin(name, both_down))
            .collect();
        Self { scenarios }
    }
}

impl Render for ScenarioCatalog {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for scenario in &self.scenarios {
            writeln!(w, "{}  {}", scenario.name.bold(), scenario.description.dimmed())?;
            if let Some(min) = scenario.min_success_percent {
                writeln!(w, "  degraded-ok probes must complete at least {min}% of the time")?;
            }
            for (i, phase) in scenario.phases.iter().enumerate() {
                let marker = if phase.mandatory { "*" } else { " " };
                let mutations: Vec<String> =
                    phase.mutations.iter().map(ToString::to_string).collect();
                writeln!(
                    w,
                    "  {i}{marker} {:<30} {:<8} {:<13} {}",
                    phase.name,
                    phase.probe.kind(),
                    phase.expectation.as_str(),
                    mutations.join("; ")
                )?;
            }
            writeln!(w)?;
        }
        writeln!(w, "{}", "* mandatory phase; node-a/node-b = first two query workers".dimmed())?;
        writeln!(
            w,
            "{}",
            "@<role> = every instance of that role; restart-random draws from the run key prefix"
                .dimmed()
        )?;
        Ok(())
    }
}
