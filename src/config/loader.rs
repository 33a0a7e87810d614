//! Configuration loading from disk.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::config::{ClientConfig, ServerConfig};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A single configuration validation failure.
#[derive(Debug)]
pub enum ValidationError {
    /// An address field does not parse as `host:port`.
    BadAddress { field: &'static str, value: String },
    /// A numeric field holds a value that cannot work.
    BadValue { field: &'static str, reason: &'static str },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::BadAddress { field, value } => {
                write!(f, "{} is not a valid socket address: {:?}", field, value)
            }
            ValidationError::BadValue { field, reason } => write!(f, "{}: {}", field, reason),
        }
    }
}

/// Load and validate a server configuration from a TOML file.
pub fn load_server_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ServerConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_server_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate a client configuration from a TOML file.
pub fn load_client_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ClientConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_client_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

pub(crate) fn validate_server_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field: "bind_address",
            value: config.bind_address.clone(),
        });
    }
    if config.buffer_capacity == 0 {
        errors.push(ValidationError::BadValue {
            field: "buffer_capacity",
            reason: "must be greater than zero",
        });
    }
    if config.pool.max_workers == Some(0) {
        errors.push(ValidationError::BadValue {
            field: "pool.max_workers",
            reason: "must be greater than zero (omit for unbounded)",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub(crate) fn validate_client_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.remote_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field: "remote_address",
            value: config.remote_address.clone(),
        });
    }
    if config.buffer_capacity == 0 {
        errors.push(ValidationError::BadValue {
            field: "buffer_capacity",
            reason: "must be greater than zero",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
