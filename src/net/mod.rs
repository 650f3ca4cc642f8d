//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → socket_guard.rs (clear a stale socket, refuse anything else)
//!     → listener.rs (bind, accept loop, connection limits)
//!
//! Incoming Unix connection
//!     → connection.rs (connection id, session tracking, close signals)
//!     → Hand off to proxy::Session
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each session tracked for graceful shutdown
//! - Only files that are sockets are ever deleted at the bind path

pub mod connection;
pub mod listener;
pub mod socket_guard;
