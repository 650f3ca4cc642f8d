//! One proxied client connection.
//!
//! # Responsibilities
//! - Dial the upstream socket once per accepted client
//! - Run upstream → client as a plain relay on its own task
//! - Run client → upstream inline, through the request rewriter
//!
//! # Design Decisions
//! - No retry on dial failure; the client is simply closed
//! - The two directions never wait for each other to shut down: each closes
//!   its own destination and fires that connection's close signal

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::config::ProxyConfig;
use crate::net::connection::{close_signal, ConnectionId};
use crate::proxy::relay::{Direction, Relay, RelaySummary};
use crate::rewrite::{RequestRewriter, ScanBuffer};

/// Per-process settings shared by every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub upstream_path: PathBuf,
    pub rewriter: RequestRewriter,
    pub buffer_capacity: usize,
    pub hold_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            upstream_path: config.upstream.socket_path.clone(),
            rewriter: RequestRewriter::from_config(&config.rewrite),
            buffer_capacity: config.relay.buffer_capacity,
            hold_timeout: config.relay.hold_timeout,
        }
    }
}

/// Outcome of both relay directions.
#[derive(Debug)]
pub struct SessionSummary {
    pub client_to_upstream: RelaySummary,
    /// `None` if the upstream → client task panicked or was cancelled.
    pub upstream_to_client: Option<RelaySummary>,
}

pub struct Session {
    id: ConnectionId,
    settings: Arc<SessionSettings>,
}

impl Session {
    pub fn new(id: ConnectionId, settings: Arc<SessionSettings>) -> Self {
        Self { id, settings }
    }

    /// Dial upstream and relay until both directions have stopped.
    ///
    /// Returns `None` if the upstream socket could not be reached.
    pub async fn run(self, mut client: UnixStream) -> Option<SessionSummary> {
        let upstream = match UnixStream::connect(&self.settings.upstream_path).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    connection_id = %self.id,
                    upstream = %self.settings.upstream_path.display(),
                    error = %e,
                    "Unable to connect to upstream socket"
                );
                let _ = client.shutdown().await;
                return None;
            }
        };

        tracing::debug!(connection_id = %self.id, "Connected to upstream");
        Some(self.relay(client, upstream).await)
    }

    /// Relay between an already-connected client and upstream.
    pub async fn relay<C, U>(self, client: C, upstream: U) -> SessionSummary
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        U: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client_rd, client_wr) = tokio::io::split(client);
        let (upstream_rd, upstream_wr) = tokio::io::split(upstream);

        // Whoever writes a connection closes it; whoever reads it watches.
        let (client_closer, client_closed) = close_signal();
        let (upstream_closer, upstream_closed) = close_signal();

        let upstream_to_client = Relay::new(
            self.id,
            Direction::UpstreamToClient,
            upstream_rd,
            upstream_closed,
            client_wr,
            client_closer,
        );
        let plain_capacity = self.settings.buffer_capacity;
        let upstream_task = tokio::spawn(upstream_to_client.copy_until_closed(plain_capacity));

        let client_to_upstream = Relay::new(
            self.id,
            Direction::ClientToUpstream,
            client_rd,
            client_closed,
            upstream_wr,
            upstream_closer,
        );
        let client_summary = client_to_upstream
            .copy_rewriting(
                &self.settings.rewriter,
                ScanBuffer::with_capacity(self.settings.buffer_capacity),
                self.settings.hold_timeout,
            )
            .await;

        let upstream_summary = match upstream_task.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!(connection_id = %self.id, error = %e, "Upstream relay task failed");
                None
            }
        };

        tracing::debug!(
            connection_id = %self.id,
            injections = client_summary.injections,
            "Session finished"
        );

        SessionSummary {
            client_to_upstream: client_summary,
            upstream_to_client: upstream_summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::relay::RelayEnd;
    use tokio::io::{duplex, AsyncReadExt};

    fn settings() -> Arc<SessionSettings> {
        Arc::new(SessionSettings {
            upstream_path: PathBuf::from("/nonexistent/upstream.sock"),
            rewriter: RequestRewriter::new("POST", "/images/create", "linux/amd64"),
            buffer_capacity: 1024,
            hold_timeout: Duration::from_millis(50),
        })
    }

    #[tokio::test]
    async fn test_session_rewrites_and_relays_response() {
        let (mut client, client_side) = duplex(8192);
        let (upstream_side, mut upstream) = duplex(8192);
        let session = Session::new(ConnectionId::new(), settings());
        let task = tokio::spawn(session.relay(client_side, upstream_side));

        client
            .write_all(b"POST /v1.41/images/create?fromImage=busybox&tag=latest HTTP/1.1\r\nHost: docker\r\n\r\n")
            .await
            .unwrap();

        let expected: &[u8] = b"POST /v1.41/images/create?fromImage=busybox&platform=linux%2Famd64&tag=latest HTTP/1.1\r\nHost: docker\r\n\r\n";
        let mut received = vec![0u8; expected.len()];
        upstream.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);

        upstream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await.unwrap();
        drop(upstream);

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

        let summary = tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .expect("client direction did not stop after upstream closed")
            .unwrap();
        assert_eq!(summary.client_to_upstream.injections, 1);
        assert!(matches!(summary.client_to_upstream.end, RelayEnd::ClosedLocally));
        assert!(matches!(
            summary.upstream_to_client.map(|s| s.end),
            Some(RelayEnd::Eof)
        ));
    }

    #[tokio::test]
    async fn test_dial_failure_closes_client() {
        let (listener_side, mut peer) = UnixStream::pair().unwrap();
        let session = Session::new(ConnectionId::new(), settings());

        assert!(session.run(listener_side).await.is_none());

        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
