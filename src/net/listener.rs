//! Unix socket listener with backpressure.
//!
//! # Responsibilities
//! - Bind the proxy socket path
//! - Accept incoming client connections
//! - Enforce max_connections limit via semaphore
//! - Classify accept errors as transient or fatal

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to the socket path.
    Bind(std::io::Error),
    /// Failed to accept one connection; the listener stays usable.
    Accept(std::io::Error),
    /// The listener can no longer accept connections.
    Unusable(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Unusable(e) => write!(f, "Listener unusable: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) | ListenerError::Unusable(e) => Some(e),
        }
    }
}

/// A bounded Unix socket listener that limits concurrent sessions.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections wait in the kernel backlog until a slot becomes available.
pub struct Listener {
    inner: UnixListener,
    path: PathBuf,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured socket path with connection limits.
    ///
    /// The path must be free; see [`crate::net::socket_guard`].
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let listener = UnixListener::bind(&config.socket_path).map_err(ListenerError::Bind)?;

        tracing::info!(
            path = %config.socket_path.display(),
            max_connections = config.max_connections,
            "Listening on proxy socket"
        );

        Ok(Self {
            inner: listener,
            path: config.socket_path.clone(),
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the session's lifetime.
    pub async fn accept(&self) -> Result<(UnixStream, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| {
                ListenerError::Unusable(std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;

        let (stream, _addr) = self.inner.accept().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidInput {
                ListenerError::Unusable(e)
            } else {
                ListenerError::Accept(e)
            }
        })?;

        tracing::debug!(
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, ConnectionPermit { _permit: permit }))
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a session slot.
///
/// When dropped, the slot is released back to the pool.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
