//! Command handlers -- one module per subcommand

pub mod config;
pub mod logs;
pub mod run;
pub mod scenarios;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use failstorm_core::config::FailstormConfig;
use failstorm_node_control::{
    BollardRuntimeClient, ControllerSettings, InstanceRegistry, NodeController,
};

use crate::error::CliError;

/// Connect to the container runtime and build a node controller over the
/// configured instances.
pub(crate) fn connect_controller(
    config: &FailstormConfig,
) -> Result<NodeController<BollardRuntimeClient>, CliError> {
    let runtime = BollardRuntimeClient::connect(
        &config.runtime.docker_socket,
        Duration::from_secs(config.runtime.request_timeout_secs),
    )?
    .with_stop_grace(Duration::from_secs(config.runtime.stop_grace_secs));

    let controller = NodeController::new(
        Arc::new(runtime),
        InstanceRegistry::from_config(&config.instances),
        ControllerSettings::from_config(config),
    )?;
    Ok(controller)
}
