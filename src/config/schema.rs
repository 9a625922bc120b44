//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the broker.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BrokerConfig {
    /// Listener settings.
    pub daemon: DaemonConfig,

    /// Queue storage settings.
    pub storage: StorageConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// TCP port to listen on.
    pub port: u16,

    /// Host or IP to bind.
    pub bind_host: String,

    /// Upper bound on how long the accept loop waits before re-checking the stop signal.
    pub poll_interval_ms: u64,
}

impl DaemonConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_host: "0.0.0.0".to_string(),
            poll_interval_ms: 1000,
        }
    }
}

/// Queue storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory per queue.
    pub data_dir: PathBuf,

    /// Queues to provision at startup.
    pub queues: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            queues: Vec::new(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (time until the response starts) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accepted payload size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl ObservabilityConfig {
    pub fn metrics_socket_addr(&self) -> Option<SocketAddr> {
        self.metrics_address.parse().ok()
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: BrokerConfig = toml::from_str("[daemon]\nport = 9000\n").unwrap();
        assert_eq!(config.daemon.port, 9000);
        assert_eq!(config.daemon.bind_host, "0.0.0.0");
        assert_eq!(config.daemon.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn full_file_parses() {
        let config: BrokerConfig = toml::from_str(
            r#"
            [daemon]
            port = 8181
            bind_host = "127.0.0.1"
            poll_interval_ms = 250

            [storage]
            data_dir = "/var/lib/fsqueue"
            queues = ["jobs", "mail"]

            [timeouts]
            request_secs = 5

            [limits]
            max_body_bytes = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.daemon.bind_address(), "127.0.0.1:8181");
        assert_eq!(config.storage.queues, vec!["jobs", "mail"]);
        assert_eq!(config.timeouts.request_secs, 5);
        assert_eq!(config.limits.max_body_bytes, 1024);
    }
}
