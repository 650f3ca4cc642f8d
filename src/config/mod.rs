//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line
//!     → cli.rs (clap parse; positional sockets, platform, log level)
//!     → loader.rs (map onto ProxyConfig)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc with the listener and every session
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the log level is fixed at startup
//! - All fields have defaults so only the positional values are required
//! - Validation separates syntactic (clap) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{load_config, ConfigError};
pub use schema::ProxyConfig;
pub use schema::{LifecycleConfig, ListenerConfig, LoggingConfig, RelayConfig, RewriteConfig, UpstreamConfig};
