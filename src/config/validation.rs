//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (limits and timeouts > 0)
//! - Check dev-mode settings are usable when dev mode is on
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: ServerConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("dev.artifact_path must be set when dev mode is enabled")]
    MissingArtifact,
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.listener.body_limit_bytes == 0 {
        errors.push(ValidationError::NotPositive {
            field: "listener.body_limit_bytes",
        });
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::NotPositive {
            field: "listener.request_timeout_secs",
        });
    }

    if config.dev.enabled {
        if config.dev.artifact_path.trim().is_empty() {
            errors.push(ValidationError::MissingArtifact);
        }
        if config.dev.debounce_ms == 0 {
            errors.push(ValidationError::NotPositive {
                field: "dev.debounce_ms",
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
