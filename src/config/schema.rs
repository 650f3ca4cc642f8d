//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! Every section has defaults; only the three socket/platform values must
//! come from the command line.

use std::path::PathBuf;
use std::time::Duration;

use crate::observability::logging::LogLevel;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Proxy socket settings.
    pub listener: ListenerConfig,

    /// Backend socket settings.
    pub upstream: UpstreamConfig,

    /// Which requests get rewritten, and how.
    pub rewrite: RewriteConfig,

    /// Relay buffering.
    pub relay: RelayConfig,

    pub logging: LoggingConfig,

    pub lifecycle: LifecycleConfig,
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Path of the Unix socket the proxy listens on.
    pub socket_path: PathBuf,

    /// Maximum concurrent sessions (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/docker-platformify.sock"),
            max_connections: 10_000,
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Path of the backend socket dialed once per session.
    pub socket_path: PathBuf,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/docker.sock"),
        }
    }
}

/// Request-line rewrite configuration.
#[derive(Debug, Clone)]
pub struct RewriteConfig {
    /// Value injected as the `platform` query parameter.
    pub platform: String,

    /// Method token opening a candidate request line.
    pub method: String,

    /// Path substring identifying the targeted endpoint.
    pub path_marker: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            platform: String::new(),
            method: "POST".to_string(),
            path_marker: "/images/create".to_string(),
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Read buffer size per direction; also the longest request line that
    /// can still be rewritten.
    pub buffer_capacity: usize,

    /// How long held bytes wait for more data before being forwarded as is.
    pub hold_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 4096,
            hold_timeout: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

/// Startup/shutdown configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Time given to open sessions after a termination signal.
    pub drain_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
        }
    }
}
