//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Failstorm -- fault-injection and recovery verification harness.
///
/// Use `failstorm <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "failstorm", version, about, long_about = None)]
pub struct Cli {
    /// Path to the failstorm.toml configuration file.
    #[arg(short, long, default_value = "failstorm.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a fault-injection scenario and report the verdict.
    Run(RunArgs),

    /// Show a fresh lifecycle/health observation of managed instances.
    Status(StatusArgs),

    /// Show filtered log lines of an instance.
    Logs(LogsArgs),

    /// List builtin scenarios.
    Scenarios,

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Run builtin scenarios and/or one loaded from a TOML file.
///
/// Several scenarios run in order as a suite with one aggregated report.
/// Exit status (worst verdict): 0 = pass, 1 = fail, 2 = partial.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Builtin scenario names (bidirectional, failover, cascading, chaos).
    #[arg(required_unless_present = "scenario_file")]
    pub scenarios: Vec<String>,

    /// Load the scenario definition from a TOML file.
    #[arg(long)]
    pub scenario_file: Option<PathBuf>,

    /// Persist the JSON report (summary and full step list) to this file.
    #[arg(long)]
    pub report_file: Option<PathBuf>,
}

// ---- status ----

/// Observe every managed instance.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show instances of this role (e.g. query-worker).
    #[arg(long)]
    pub role: Option<String>,
}

// ---- logs ----

/// Show the last lines of an instance log.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Instance (container) name.
    pub instance: String,

    /// Number of trailing lines to read.
    #[arg(long, default_value_t = 100)]
    pub tail: usize,

    /// Keep only lines containing this keyword (case-insensitive, repeatable).
    #[arg(long = "grep")]
    pub keywords: Vec<String>,
}

// ---- config ----

/// Manage failstorm configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, runtime, instances, timeouts,
        /// health, data_plane, probe, scenario).
        #[arg(long)]
        section: Option<String>,
    },
}
