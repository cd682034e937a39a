//! CLI-specific error types and exit code mapping

use failstorm_core::error::FailstormError;
use failstorm_node_control::NodeControlError;
use failstorm_scenario::ScenarioError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes that do not
/// collide with the verdict codes of `failstorm run`.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Scenario definition could not be found, loaded or validated.
    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    /// The container runtime could not be reached or refused a request.
    #[error("runtime error: {0}")]
    Runtime(#[from] NodeControlError),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from failstorm-core.
    #[error("{0}")]
    Core(#[from] FailstormError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success / verdict `pass`                 |
    /// | 1    | Verdict `fail` or general command error  |
    /// | 2    | Verdict `partial`                        |
    /// | 3    | Configuration or scenario definition     |
    /// | 4    | Container runtime unavailable            |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Core(_) | Self::Scenario(_) => 3,
            Self::Runtime(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}
