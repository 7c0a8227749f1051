//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the relay proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single upstream every request is forwarded to.
    pub upstream: UpstreamConfig,

    /// Path prefixes selecting the forwarding mode.
    pub routes: RouteConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request header translation policy.
    pub headers: HeaderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5050").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5050".to_string(),
        }
    }
}

/// Upstream origin and connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URI of the upstream (e.g., "http://127.0.0.1:8081").
    /// The request path remainder is appended to its path.
    pub base_uri: String,

    /// Ceiling on concurrent upstream connections.
    pub max_connections: usize,

    /// Largest body the buffered mode will hold in memory.
    pub max_buffered_body_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_uri: "http://127.0.0.1:8081".to_string(),
            max_connections: 32,
            max_buffered_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Route prefixes for the two forwarding modes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Prefix served by the buffered forwarder.
    pub buffered_prefix: String,

    /// Prefix served by the streaming forwarder.
    pub streaming_prefix: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            buffered_prefix: "/proxy".to_string(),
            streaming_prefix: "/proxy-stream".to_string(),
        }
    }
}

/// Timeout configuration, applied identically to both modes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Maximum wait for response headers or the next body chunk, in milliseconds.
    pub read_ms: u64,

    /// Time in-flight exchanges get to finish after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            read_ms: 30_000,
            shutdown_grace_secs: 10,
        }
    }
}

/// Header translation policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HeaderConfig {
    /// Strip hop-by-hop headers before forwarding.
    /// Off by default: headers are copied verbatim.
    pub strip_hop_by_hop: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for development.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation.
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

    /// Log materialized bodies in buffered mode (debug level).
    pub log_buffered_bodies: bool,

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
            log_buffered_bodies: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:5050");
        assert_eq!(config.routes.buffered_prefix, "/proxy");
        assert_eq!(config.routes.streaming_prefix, "/proxy-stream");
        assert_eq!(config.timeouts.read(), Duration::from_secs(30));
        assert!(!config.headers.strip_hop_by_hop);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [upstream]
            base_uri = "http://10.0.0.7:9000/api"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.base_uri, "http://10.0.0.7:9000/api");
        assert_eq!(config.upstream.max_connections, 32);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.timeouts.connect_ms, 5_000);
    }
}
