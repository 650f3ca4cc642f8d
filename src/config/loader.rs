//! Configuration loading from the command line.

use std::time::Duration;

use crate::config::cli::Cli;
use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Build and validate configuration from parsed arguments.
pub fn load_config(cli: Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = ProxyConfig::default();

    config.upstream.socket_path = cli.upstream_socket;
    config.listener.socket_path = cli.proxy_socket;
    config.listener.max_connections = cli.max_connections;
    config.rewrite.platform = cli.platform;
    config.relay.buffer_capacity = cli.buffer_size;
    config.relay.hold_timeout = Duration::from_millis(cli.hold_timeout_ms);
    config.logging.level = cli.log_level;
    config.lifecycle.drain_timeout = Duration::from_secs(cli.drain_timeout_secs);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
