//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (clap handles syntactic)
//! - Validate value ranges (buffer size, timeouts, limits)
//! - Reject rewrite patterns the scanner cannot work with
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Smallest scan buffer that still fits a realistic image-create line.
pub const MIN_BUFFER_CAPACITY: usize = 256;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("platform must not be empty")]
    EmptyPlatform,

    #[error("rewrite method must be a non-empty token without whitespace")]
    InvalidMethod,

    #[error("path marker must not be empty")]
    EmptyPathMarker,

    #[error("buffer size {0} is below the minimum of {min} bytes", min = MIN_BUFFER_CAPACITY)]
    BufferTooSmall(usize),

    #[error("hold timeout must be greater than zero")]
    ZeroHoldTimeout,

    #[error("max connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("proxy socket and upstream socket are the same path")]
    SocketPathConflict,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.rewrite.platform.trim().is_empty() {
        errors.push(ValidationError::EmptyPlatform);
    }
    let method = &config.rewrite.method;
    if method.is_empty() || method.bytes().any(|b| b.is_ascii_whitespace()) {
        errors.push(ValidationError::InvalidMethod);
    }
    if config.rewrite.path_marker.is_empty() {
        errors.push(ValidationError::EmptyPathMarker);
    }
    if config.relay.buffer_capacity < MIN_BUFFER_CAPACITY {
        errors.push(ValidationError::BufferTooSmall(config.relay.buffer_capacity));
    }
    if config.relay.hold_timeout.is_zero() {
        errors.push(ValidationError::ZeroHoldTimeout);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if config.listener.socket_path == config.upstream.socket_path {
        errors.push(ValidationError::SocketPathConflict);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
