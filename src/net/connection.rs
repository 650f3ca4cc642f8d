//! Connection identity, session accounting and close signalling.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count active sessions so shutdown can drain them
//! - Let the direction that writes a connection tell the direction that
//!   reads it that the connection was closed locally
//! - Classify I/O errors that are expected during teardown

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a proxied connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts sessions that are still relaying.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until no session is active or `timeout` elapses.
    ///
    /// Returns `true` if every session finished in time.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let drained = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

/// Guard that tracks a session's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Session finished");
    }
}

/// Create the two ends of a close signal for one connection.
///
/// The relay that writes to the connection owns the [`CloseNotifier`]; the
/// relay that reads from it owns the [`CloseWatch`].
pub fn close_signal() -> (CloseNotifier, CloseWatch) {
    let (tx, rx) = watch::channel(false);
    (CloseNotifier { tx }, CloseWatch { rx })
}

/// Write side of a close signal.
#[derive(Debug)]
pub struct CloseNotifier {
    tx: watch::Sender<bool>,
}

impl CloseNotifier {
    /// Mark the connection closed. Idempotent.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }
}

/// Read side of a close signal.
#[derive(Debug, Clone)]
pub struct CloseWatch {
    rx: watch::Receiver<bool>,
}

impl CloseWatch {
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the connection has been closed locally.
    ///
    /// Never resolves if the notifier is dropped without closing.
    pub async fn closed(&mut self) {
        if self.rx.wait_for(|closed| *closed).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// True for errors that only mean the peer or the other direction already
/// tore the connection down.
pub fn is_benign_close(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn tracker_wait_until_idle() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();
        assert!(!tracker.wait_until_idle(Duration::from_millis(150)).await);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });
        assert!(tracker.wait_until_idle(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn close_signal_wakes_watcher() {
        let (notifier, mut watch) = close_signal();
        assert!(!watch.is_closed());

        let waiter = tokio::spawn(async move {
            watch.closed().await;
            watch.is_closed()
        });
        notifier.close();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn dropped_notifier_never_closes() {
        let (notifier, mut watch) = close_signal();
        drop(notifier);
        let res = tokio::time::timeout(Duration::from_millis(50), watch.closed()).await;
        assert!(res.is_err());
    }

    #[test]
    fn benign_close_kinds() {
        assert!(is_benign_close(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_benign_close(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_benign_close(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
