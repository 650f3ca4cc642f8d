//! docker-platformify library

pub mod config;
pub mod net;
pub mod proxy;
pub mod rewrite;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use proxy::ProxyServer;
pub use lifecycle::Shutdown;
pub use rewrite::RequestRewriter;
