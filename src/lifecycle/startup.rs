//! Startup orchestration.
//!
//! # Responsibilities
//! - Clear a stale proxy socket, refusing to touch anything else
//! - Bind the listener and run the accept loop
//! - On shutdown, drain open sessions and remove the socket file
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::lifecycle::{signals, Shutdown};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::net::socket_guard::{ensure_socket_path_free, GuardError};
use crate::proxy::ProxyServer;

/// Errors that stop the process.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("unable to listen on proxy socket: {0}")]
    Listener(#[from] ListenerError),
}

/// Run the proxy until SIGINT/SIGTERM.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    signals::install(shutdown);
    serve(config, shutdown_rx).await
}

/// Guard the socket path, bind, and serve until `shutdown` fires.
pub async fn serve(
    config: ProxyConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), StartupError> {
    ensure_socket_path_free(&config.listener.socket_path)?;
    let listener = Listener::bind(&config.listener)?;

    let tracker = ConnectionTracker::new();
    let server = ProxyServer::new(&config, tracker.clone());
    let result = server.run(listener, shutdown).await;

    let open = tracker.active_count();
    if open > 0 {
        tracing::info!(active_sessions = open, "Waiting for open sessions to finish");
        if !tracker.wait_until_idle(config.lifecycle.drain_timeout).await {
            tracing::warn!(
                active_sessions = tracker.active_count(),
                "Drain timeout elapsed, abandoning open sessions"
            );
        }
    }

    if let Err(e) = std::fs::remove_file(&config.listener.socket_path) {
        tracing::warn!(
            path = %config.listener.socket_path.display(),
            error = %e,
            "Unable to remove proxy socket"
        );
    }

    result.map_err(StartupError::from)
}
