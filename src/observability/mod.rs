//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listener, sessions and relays produce:
//!     → tracing events with connection_id / direction fields
//!     → logging.rs (level filter + fmt layer, stderr)
//! ```
//!
//! # Design Decisions
//! - Structured fields instead of formatted payloads
//! - Every session-scoped event carries its connection id
//! - Request bytes are only ever logged at trace level

pub mod logging;
