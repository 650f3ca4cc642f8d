//! Structured logging.
//!
//! # Responsibilities
//! - Parse the command-line log level names
//! - Map them onto tracing levels
//! - Install the global subscriber once at startup
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Level comes from the command line only and never changes afterwards
//! - CRITICAL and NOTICE have no tracing counterpart; they fold into
//!   ERROR and INFO respectively

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Notice,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Critical,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Notice,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Critical => "CRITICAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Notice => "NOTICE",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Filter directive scoping the level to this crate.
    pub fn directive(self) -> String {
        let level = match self {
            LogLevel::Critical | LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Notice | LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        format!("{}={}", env!("CARGO_CRATE_NAME"), level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown log level name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid log level '{0}': must be one of CRITICAL, ERROR, WARNING, NOTICE, INFO, DEBUG")]
pub struct LogLevelError(pub String);

impl FromStr for LogLevel {
    type Err = LogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LogLevelError(s.to_string()))
    }
}

/// Install the global tracing subscriber.
pub fn init(level: LogLevel) {
    tracing_subscriber::registry()
        .with(EnvFilter::new(level.directive()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
