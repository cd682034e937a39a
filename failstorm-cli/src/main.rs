//! Failstorm CLI -- fault-injection and recovery verification harness.
//!
//! Entry point: parses CLI arguments, loads configuration, initializes
//! logging and dispatches to the command handlers. `failstorm run` exits
//! with the verdict code (pass 0, fail 1, partial 2).

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;

use failstorm_core::config::{FailstormConfig, ScenarioConfig};
use failstorm_core::error::FailstormError;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = FailstormConfig::load(&cli.config).await;

    let mut general = loaded
        .as_ref()
        .map(|config| config.general.clone())
        .unwrap_or_default();
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("error: failed to initialize logging: {e}");
        return ExitCode::from(1);
    }

    let writer = OutputWriter::new(cli.output);

    match dispatch(cli, loaded, &writer).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn dispatch(
    cli: Cli,
    loaded: Result<FailstormConfig, FailstormError>,
    writer: &OutputWriter,
) -> Result<u8, CliError> {
    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &loaded?, writer).await,
        Commands::Status(args) => {
            commands::status::execute(args, &loaded?, writer).await?;
            Ok(0)
        }
        Commands::Logs(args) => {
            commands::logs::execute(args, &loaded?, writer).await?;
            Ok(0)
        }
        Commands::Scenarios => {
            let both_down = match &loaded {
                Ok(config) => config.scenario.both_down_expectation,
                Err(_) => ScenarioConfig::default().both_down_expectation,
            };
            commands::scenarios::execute(both_down, writer)?;
            Ok(0)
        }
        Commands::Config(args) => {
            commands::config::execute(args, &cli.config, loaded, writer).await?;
            Ok(0)
        }
    }
}
