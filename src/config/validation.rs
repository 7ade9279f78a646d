//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Detect duplicate listener addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DecoyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::DecoyConfig;

/// Smallest head buffer that can hold a plausible request line.
const MIN_HEADER_BYTES: usize = 64;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_addresses must not be empty")]
    NoBindAddresses,

    #[error("listener address {0:?} is not a valid socket address")]
    InvalidBindAddress(String),

    #[error("listener address {0} is listed more than once")]
    DuplicateBindAddress(SocketAddr),

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("handler.max_header_bytes must be at least 64, got {0}")]
    HeaderBufferTooSmall(usize),

    #[error("handler.max_headers must be greater than zero")]
    ZeroMaxHeaders,

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("observability.metrics_address {0:?} is not a valid socket address")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &DecoyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_addresses.is_empty() {
        errors.push(ValidationError::NoBindAddresses);
    }
    let mut seen = HashSet::new();
    for raw in &config.listener.bind_addresses {
        match raw.parse::<SocketAddr>() {
            Ok(addr) => {
                // Port 0 asks the OS for a fresh port each time.
                if addr.port() != 0 && !seen.insert(addr) {
                    errors.push(ValidationError::DuplicateBindAddress(addr));
                }
            }
            Err(_) => errors.push(ValidationError::InvalidBindAddress(raw.clone())),
        }
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    if config.handler.max_header_bytes < MIN_HEADER_BYTES {
        errors.push(ValidationError::HeaderBufferTooSmall(config.handler.max_header_bytes));
    }
    if config.handler.max_headers == 0 {
        errors.push(ValidationError::ZeroMaxHeaders);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
