//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::observability::logging::LogLevel;

#[derive(Debug, Parser)]
#[command(name = "docker-platformify", version)]
#[command(about = "Unix socket proxy that injects a platform into image pulls", long_about = None)]
#[command(after_help = "Log level must be one of: CRITICAL, ERROR, WARNING, NOTICE, INFO, DEBUG; default INFO")]
pub struct Cli {
    /// Backend socket to forward to (e.g. /var/run/docker.sock)
    pub upstream_socket: PathBuf,

    /// Socket to create and listen on
    pub proxy_socket: PathBuf,

    /// Platform injected into image create requests (e.g. linux/arm64)
    pub platform: String,

    /// Log level
    #[arg(default_value = "INFO")]
    pub log_level: LogLevel,

    /// Maximum concurrent sessions
    #[arg(long, default_value_t = 10_000)]
    pub max_connections: usize,

    /// Relay buffer size in bytes; bounds the longest rewritable request line
    #[arg(long = "buffer-size", default_value_t = 4096)]
    pub buffer_size: usize,

    /// Milliseconds held bytes wait for more data before being forwarded as is
    #[arg(long, default_value_t = 50)]
    pub hold_timeout_ms: u64,

    /// Seconds open sessions get to finish after SIGINT/SIGTERM
    #[arg(long, default_value_t = 5)]
    pub drain_timeout_secs: u64,
}
