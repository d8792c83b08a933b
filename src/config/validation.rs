//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject malformed or duplicate pool members
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::uri::Authority;
use thiserror::Error;

use crate::config::schema::BalancerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server pool is empty")]
    EmptyPool,

    #[error("server `{0}` is not a host:port pair")]
    InvalidServer(String),

    #[error("server `{0}` is listed more than once")]
    DuplicateServer(String),

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("health_check.jitter_ms ({jitter_ms}) must not exceed the interval ({interval_ms} ms)")]
    JitterExceedsInterval { jitter_ms: u64, interval_ms: u64 },

    #[error("health check path `{0}` must start with '/'")]
    InvalidHealthPath(String),

    #[error("{field} `{value}` is not a socket address")]
    InvalidAddress { field: &'static str, value: String },
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.pool.servers.is_empty() {
        errors.push(ValidationError::EmptyPool);
    }

    let mut seen = HashSet::new();
    for server in &config.pool.servers {
        let valid = Authority::from_str(server)
            .map(|authority| authority.port_u16().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidServer(server.clone()));
        }
        if !seen.insert(server.as_str()) {
            errors.push(ValidationError::DuplicateServer(server.clone()));
        }
    }

    if config.forwarding.timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration { field: "forwarding.timeout_secs" });
    }
    if config.health_check.interval_secs == 0 {
        errors.push(ValidationError::ZeroDuration { field: "health_check.interval_secs" });
    }
    if config.health_check.timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration { field: "health_check.timeout_secs" });
    }
    let interval_ms = config.health_check.interval_secs.saturating_mul(1000);
    if config.health_check.jitter_ms > interval_ms {
        errors.push(ValidationError::JitterExceedsInterval {
            jitter_ms: config.health_check.jitter_ms,
            interval_ms,
        });
    }
    if !config.health_check.path.starts_with('/') {
        errors.push(ValidationError::InvalidHealthPath(config.health_check.path.clone()));
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
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
