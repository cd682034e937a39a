//! `failstorm config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use failstorm_core::config::FailstormConfig;
use failstorm_core::error::FailstormError;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: [&str; 8] = [
    "general",
    "runtime",
    "instances",
    "timeouts",
    "health",
    "data_plane",
    "probe",
    "scenario",
];

/// Execute the `config` command.
///
/// `loaded` is the result of loading `config_path`; `validate` reports its
/// error instead of failing outright.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    loaded: Result<FailstormConfig, FailstormError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, loaded, writer),
        ConfigAction::Show { section } => execute_show(config_path, loaded?, section, writer),
    }
}

/// Report whether the configuration file loads and validates.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails (parse errors, invalid values).
fn execute_validate(
    config_path: &Path,
    loaded: Result<FailstormConfig, FailstormError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: loaded.is_ok(),
        errors: loaded.err().map(|e| vec![e.to_string()]).unwrap_or_default(),
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Display the effective configuration (file + env overrides + defaults).
///
/// The data-plane token is redacted.
fn execute_show(
    config_path: &Path,
    mut config: FailstormConfig,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    if !config.data_plane.token.is_empty() {
        config.data_plane.token = "***REDACTED***".to_owned();
    }

    let config_toml = match section.as_deref() {
        None => to_toml(&config),
        Some("general") => to_toml(&config.general),
        Some("runtime") => to_toml(&config.runtime),
        Some("instances") => to_toml(&config.instances),
        Some("timeouts") => to_toml(&config.timeouts),
        Some("health") => to_toml(&config.health),
        Some("data_plane") => to_toml(&config.data_plane),
        Some("probe") => to_toml(&config.probe),
        Some("scenario") => to_toml(&config.scenario),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: {})",
                SECTIONS.join(", ")
            )));
        }
    };

    writer.render(&ConfigReport {
        source: config_path.display().to_string(),
        section,
        config_toml,
    })?;
    Ok(())
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

/// Configuration display report.
///
/// The `config_toml` field is only used for text rendering.
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration (token redacted)
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
