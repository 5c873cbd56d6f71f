//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// TLS terminating listener and its upstream.
    pub tls: TlsConfig,

    /// Plaintext listener that redirects to HTTPS.
    pub redirect: RedirectConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct TlsConfig {
    /// Port the TLS listener binds on `0.0.0.0`.
    pub port: u16,

    /// Absolute URL of the single upstream origin (e.g., "http://localhost:9000").
    pub upstream: String,

    /// Path to certificate file (PEM).
    pub cert_file: PathBuf,

    /// Path to private key file (PEM).
    pub key_file: PathBuf,
}

/// Redirect listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RedirectConfig {
    /// Whether the plaintext redirect listener runs at all.
    pub enabled: bool,

    /// Port the redirect listener binds on `0.0.0.0`.
    pub port: u16,

    /// Port written into the `Location` of every redirect.
    pub upstream_port: u16,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 0,
            upstream_port: 0,
        }
    }
}

/// Timeout configuration shared by both listeners.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time in-flight requests get to finish once a listener is stopped.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "tls_edge_proxy=info,tower_http=info".to_string(),
        }
    }
}
