//! Resilience helpers.
//!
//! # Design Decisions
//! - Sessions never retry: a failed dial or copy ends the session
//! - The accept loop is the only place that waits before trying again,
//!   so descriptor exhaustion does not turn into a busy loop

pub mod backoff;
