//! Request-line rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! client read
//!     → scan_buffer.rs (carry-over window across reads)
//!     → rewriter.rs (per-window decision: pass / split / hold / inject / fail open)
//!     → query.rs (strict query parse, platform injection, deterministic encode)
//!     → bytes handed back to the relay for forwarding
//! ```
//!
//! # Design Decisions
//! - Byte-window scanner, not an HTTP parser: only the first line of a
//!   matching request is ever interpreted
//! - Every ambiguity resolves to forwarding the original bytes (fail open)
//! - The window is bounded by the scan buffer capacity

pub mod query;
pub mod rewriter;
pub mod scan_buffer;

pub use rewriter::{Decision, InjectError, RequestRewriter};
pub use scan_buffer::ScanBuffer;
