//! Accept loop for the proxy socket.
//!
//! # Responsibilities
//! - Accept client connections until shutdown is requested
//! - Spawn one session per connection
//! - Keep accepting through transient accept failures

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::proxy::session::{Session, SessionSettings};
use crate::resilience::backoff::calculate_backoff;

/// Proxy server bound to one listener.
pub struct ProxyServer {
    settings: Arc<SessionSettings>,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    pub fn new(config: &ProxyConfig, tracker: ConnectionTracker) -> Self {
        Self {
            settings: Arc::new(SessionSettings::from_config(config)),
            tracker,
        }
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Only an unusable listener ends the loop with an error.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        tracing::info!(
            path = %listener.path().display(),
            upstream = %self.settings.upstream_path.display(),
            platform = self.settings.rewriter.platform(),
            "Proxy server starting"
        );

        let mut consecutive_failures = 0u32;
        loop {
            let accepted = tokio::select! {
                res = listener.accept() => res,
                _ = shutdown.recv() => {
                    tracing::info!("Stopped accepting connections");
                    return Ok(());
                }
            };

            match accepted {
                Ok((stream, permit)) => {
                    consecutive_failures = 0;
                    let guard = self.tracker.track();
                    tracing::info!(
                        connection_id = %guard.id(),
                        active_sessions = self.tracker.active_count(),
                        "New connection to proxy socket"
                    );

                    let session = Session::new(guard.id(), Arc::clone(&self.settings));
                    tokio::spawn(async move {
                        let _permit = permit;
                        let _guard = guard;
                        session.run(stream).await;
                    });
                }
                Err(e @ ListenerError::Unusable(_)) => return Err(e),
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    let delay = calculate_backoff(consecutive_failures);
                    tracing::error!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Unable to accept connection"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
