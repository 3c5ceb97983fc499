//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check listen addresses are usable prefixes
//! - Validate value ranges (limits > 0, log filter parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HostConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::config::schema::HostConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.addresses must not be empty")]
    NoAddresses,

    #[error("server.addresses entry '{address}' is invalid: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("observability.log_level '{0}' is not a valid filter")]
    InvalidLogLevel(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &HostConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.addresses.is_empty() {
        errors.push(ValidationError::NoAddresses);
    }
    for address in &config.server.addresses {
        if let Err(reason) = check_address(address) {
            errors.push(ValidationError::InvalidAddress {
                address: address.clone(),
                reason,
            });
        }
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero {
            field: "listener.max_connections",
        });
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero {
            field: "listener.max_body_bytes",
        });
    }

    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(address: &str) -> Result<(), String> {
    let normalized = address
        .replacen("://+", "://0.0.0.0", 1)
        .replacen("://*", "://0.0.0.0", 1);
    let url = Url::parse(&normalized).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("scheme '{}' is not supported", url.scheme()));
    }
    if url.host().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}
