//! `failstorm run` command handler

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use failstorm_core::config::FailstormConfig;
use failstorm_scenario::{
    EngineSettings, MilvusRestClient, RunReport, ScenarioDefinition, ScenarioEngine, ScenarioError,
    ScenarioRun, StepStatus, SuiteReport, Verdict, find_builtin, load_scenario_from_file,
    write_report, write_suite_report,
};

use crate::cli::RunArgs;
use crate::commands::connect_controller;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command and return the verdict exit code.
///
/// Several scenarios run back to back as a suite on one engine; the exit code
/// is the worst verdict. The container runtime is pinged before the first
/// scenario. The report is rendered even when a run aborts; only failures
/// before the first phase (bad definition, unreachable runtime) return `Err`.
pub async fn execute(
    args: RunArgs,
    config: &FailstormConfig,
    writer: &OutputWriter,
) -> Result<u8, CliError> {
    let scenarios = select_scenarios(&args, config)?
        .iter()
        .map(|scenario| scenario.resolve(&config.instances))
        .collect::<Result<Vec<_>, _>>()?;

    let controller = connect_controller(config)?;
    let data_plane = MilvusRestClient::new(&config.data_plane)
        .map_err(|e| CliError::Command(format!("data-plane client: {e}")))?;
    let mut engine = ScenarioEngine::new(
        controller,
        Arc::new(data_plane),
        EngineSettings::from_config(config),
    );

    engine.controller().check_control().await?;
    info!(scenarios = scenarios.len(), "container runtime reachable");

    let mut runs = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        info!(scenario = scenario.name.as_str(), "running scenario");
        runs.push(engine.run(scenario).await?);
    }

    conclude(&runs, args.report_file.as_deref(), writer).await
}

/// Builtin names in command-line order, then the scenario file if given.
fn select_scenarios(
    args: &RunArgs,
    config: &FailstormConfig,
) -> Result<Vec<ScenarioDefinition>, CliError> {
    let both_down = config.scenario.both_down_expectation;
    let mut selected = args
        .scenarios
        .iter()
        .map(|name| find_builtin(name, both_down))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(path) = &args.scenario_file {
        selected.push(load_scenario_from_file(path)?);
    }
    if selected.is_empty() {
        return Err(CliError::Command(
            "a scenario name or --scenario-file is required".to_owned(),
        ));
    }
    Ok(selected)
}

/// Render the result, write the optional report file and map the verdict.
///
/// A report file that cannot be written is logged; the exit code still
/// reflects the verdict.
async fn conclude(
    runs: &[ScenarioRun],
    report_file: Option<&Path>,
    writer: &OutputWriter,
) -> Result<u8, CliError> {
    match runs {
        [run] => writer.render(&RunReport::new(run))?,
        _ => writer.render(&SuiteReport::new(runs))?,
    }

    if let Some(path) = report_file {
        if let Err(e) = persist_report(path, runs).await {
            warn!(
                path = %path.display(),
                error = %e,
                "failed to write report file, exit code still reflects the verdict"
            );
        }
    }

    Ok(verdict_exit_code(Verdict::worst(
        runs.iter().map(ScenarioRun::verdict),
    )))
}

async fn persist_report(path: &Path, runs: &[ScenarioRun]) -> Result<(), ScenarioError> {
    match runs {
        [run] => write_report(path, run).await,
        _ => write_suite_report(path, &SuiteReport::new(runs)).await,
    }
}

/// Map a verdict to the process exit code: pass 0, fail 1, partial 2.
pub fn verdict_exit_code(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Pass => 0,
        Verdict::Fail => 1,
        Verdict::Partial => 2,
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let s = &self.summary;
        writeln!(w, "Scenario: {} (key prefix: {})", s.scenario.bold(), s.key_prefix)?;
        writeln!(w, "Started:  {}", s.started_at)?;
        writeln!(w, "Duration: {:.1}s", s.duration_ms as f64 / 1000.0)?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<3} {:<30} {:<14} {:<8} {:<10} {:<14} {:>9}",
            "#", "Phase", "Expectation", "Probe", "Outcome", "Status", "Latency"
        )?;
        writeln!(w, "{}", "-".repeat(94))?;

        for step in self.run.steps() {
            let status = match step.status {
                StepStatus::Passed => step.status.as_str().green(),
                StepStatus::Failed => step.status.as_str().red(),
                StepStatus::Characterized => step.status.as_str().yellow(),
                StepStatus::Aborted => step.status.as_str().red().bold(),
            };
            let phase = if step.mandatory {
                format!("{} *", step.phase)
            } else {
                step.phase.clone()
            };
            writeln!(
                w,
                "{:<3} {:<30} {:<14} {:<8} {:<10} {:<14} {:>7}ms",
                step.position,
                phase,
                step.expectation.as_str(),
                step.probe,
                step.outcome,
                status,
                step.latency_ms
            )?;
            if !step.mutations.is_empty() {
                writeln!(w, "    {}", step.mutations.join("; ").dimmed())?;
            }
            if !step.detail.is_empty() {
                writeln!(w, "    {}", step.detail.dimmed())?;
            }
            if let Some(error) = &step.error {
                let kind = step.error_kind.map(|k| k.as_str()).unwrap_or("error");
                writeln!(w, "    {}: {}", kind, error)?;
            }
            for line in &step.diagnostics {
                writeln!(w, "    | {}", line.dimmed())?;
            }
        }

        for phase in &s.not_run {
            writeln!(w, "{:<3} {:<30} {}", "-", phase, "not run".dimmed())?;
        }

        writeln!(w)?;
        writeln!(
            w,
            "Steps: {} passed, {} failed, {} characterized, {} aborted ({} probes attempted)",
            s.counts.passed,
            s.counts.failed,
            s.counts.characterized,
            s.counts.aborted,
            s.probes_attempted
        )?;
        if s.degraded.total > 0 {
            write!(
                w,
                "Degraded-ok probes: {}/{} completed",
                s.degraded.completed, s.degraded.total
            )?;
            if let Some(min) = s.min_success_percent {
                write!(w, " (threshold {min}%)")?;
            }
            writeln!(w)?;
        }
        if let Some(reason) = &s.abort_reason {
            writeln!(w, "Aborted: {}", reason.red())?;
        }
        writeln!(w, "Verdict: {}", colored_verdict(s.verdict))?;
        Ok(())
    }
}

impl Render for SuiteReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for report in &self.runs {
            report.render_text(w)?;
            writeln!(w)?;
        }

        writeln!(w, "{}", "Suite".bold())?;
        writeln!(w, "{:<24} {:<10} {:>10}", "Scenario", "Verdict", "Duration")?;
        writeln!(w, "{}", "-".repeat(46))?;
        for report in &self.runs {
            let s = &report.summary;
            writeln!(
                w,
                "{:<24} {:<10} {:>9.1}s",
                s.scenario,
                s.verdict.as_str(),
                s.duration_ms as f64 / 1000.0
            )?;
        }
        writeln!(w)?;
        writeln!(w, "Suite verdict: {}", colored_verdict(self.verdict))?;
        Ok(())
    }
}

fn colored_verdict(verdict: Verdict) -> colored::ColoredString {
    use colored::Colorize;

    match verdict {
        Verdict::Pass => "PASS".green().bold(),
        Verdict::Partial => "PARTIAL".yellow().bold(),
        Verdict::Fail => "FAIL".red().bold(),
    }
}
