//! Proxy core.
//!
//! # Data Flow
//! ```text
//! server.rs (accept loop)
//!     → session.rs (dial upstream, one per client)
//!         → relay.rs  upstream → client   plain copy, spawned
//!         → relay.rs  client → upstream   scan buffer + rewriter, inline
//! ```
//!
//! # Design Decisions
//! - One task per session plus one extra task for the response direction
//! - No state shared between sessions
//! - Each relay owns exactly one destination and closes it once

pub mod relay;
pub mod server;
pub mod session;

pub use relay::{Direction, Relay, RelayEnd, RelaySummary};
pub use server::ProxyServer;
pub use session::{Session, SessionSettings, SessionSummary};
