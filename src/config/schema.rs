//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the decoy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the HTTP decoy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DecoyConfig {
    /// Listener configuration (monitored ports, connection limit).
    pub listener: ListenerConfig,

    /// Request decoding limits and forensic options.
    pub handler: HandlerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Addresses to impersonate an HTTP server on (e.g., "0.0.0.0:8080").
    pub bind_addresses: Vec<String>,

    /// Maximum concurrent connections across all ports (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addresses: vec!["0.0.0.0:8080".to_string()],
            max_connections: 10_000,
        }
    }
}

/// Limits applied while decoding an untrusted request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Maximum size of the request line plus headers, in bytes.
    pub max_header_bytes: usize,

    /// Maximum number of header lines.
    pub max_headers: usize,

    /// Largest declared body the handler agrees to capture, in bytes.
    pub max_body_bytes: u64,

    /// Emit a debug-level dump of the full request head.
    pub dump_requests: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_headers: 100,
            max_body_bytes: 16 * 1024 * 1024,
            dump_requests: false,
        }
    }
}

/// Timeout configuration. The handler itself never times out; the host does.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for one request/response exchange, in seconds.
    pub request_secs: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Output format for the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: DecoyConfig = toml::from_str(
            r#"
            [listener]
            bind_addresses = ["127.0.0.1:80", "127.0.0.1:8545"]

            [handler]
            dump_requests = true

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_addresses.len(), 2);
        assert_eq!(config.listener.max_connections, 10_000);
        assert!(config.handler.dump_requests);
        assert_eq!(config.handler.max_headers, 100);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.timeouts.request_secs, 30);
    }

    #[test]
    fn empty_file_is_default() {
        let config: DecoyConfig = toml::from_str("").unwrap();
        assert_eq!(config.handler, HandlerConfig::default());
        assert_eq!(config.listener.bind_addresses, vec!["0.0.0.0:8080".to_string()]);
    }
}
