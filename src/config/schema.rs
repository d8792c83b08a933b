//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The fixed server pool.
    pub pool: PoolConfig,

    /// Forwarding behaviour (timeout, tracing header).
    pub forwarding: ForwardingConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8090").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8090".to_string(),
        }
    }
}

impl ListenerConfig {
    /// Replace the port of the bind address, keeping the host.
    pub fn set_port(&mut self, port: u16) {
        let host = match self.bind_address.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.bind_address.clone(),
        };
        self.bind_address = format!("{}:{}", host, port);
    }
}

/// Backend server pool. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Ordered list of backends as `host:port`.
    pub servers: Vec<String>,

    /// Whether backends are reached over HTTPS.
    pub https: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                "server1:8080".to_string(),
                "server2:8080".to_string(),
                "server3:8080".to_string(),
            ],
            https: false,
        }
    }
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Deadline in seconds for a backend to start answering a forwarded request.
    pub timeout_secs: u64,

    /// Add an `lb-from` header naming the chosen backend to every relayed response.
    pub trace: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3,
            trace: false,
        }
    }
}

impl ForwardingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Upper bound of a random delay added before each backend's first probe,
    /// in milliseconds. Spreads probes of a large pool; the steady-state
    /// interval is unaffected.
    pub jitter_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            timeout_secs: 3,
            path: "/health".to_string(),
            jitter_ms: 0,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
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
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8091".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_command_line_defaults() {
        let config = BalancerConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8090");
        assert_eq!(config.pool.servers.len(), 3);
        assert!(!config.pool.https);
        assert_eq!(config.forwarding.timeout(), Duration::from_secs(3));
        assert!(!config.forwarding.trace);
        assert_eq!(config.health_check.interval(), Duration::from_secs(10));
        assert_eq!(config.health_check.path, "/health");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: BalancerConfig = toml::from_str(
            r#"
            [pool]
            servers = ["a:1", "b:2"]

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.servers, vec!["a:1", "b:2"]);
        assert!(!config.pool.https);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.forwarding.timeout_secs, 3);
    }

    #[test]
    fn test_set_port() {
        let mut listener = ListenerConfig::default();
        listener.set_port(9000);
        assert_eq!(listener.bind_address, "0.0.0.0:9000");
    }
}
