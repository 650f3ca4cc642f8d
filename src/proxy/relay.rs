//! One-directional byte relay.
//!
//! # Responsibilities
//! - Copy bytes from a source half to a destination half in read order
//! - Optionally route the client → upstream bytes through the scan buffer
//!   and request rewriter
//! - Close the destination exactly once on exit and signal the opposite
//!   direction
//!
//! # Design Decisions
//! - Reads are plain async reads raced against the source's close signal;
//!   there is no periodic wake-up unless bytes are being held
//! - Already-read bytes are always written before the loop exits
//! - Closure-class errors are logged at debug, never at error

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::connection::{is_benign_close, CloseNotifier, CloseWatch, ConnectionId};
use crate::rewrite::{Decision, RequestRewriter, ScanBuffer};

/// Which way a relay moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => f.write_str("client -> upstream"),
            Direction::UpstreamToClient => f.write_str("upstream -> client"),
        }
    }
}

/// Why a relay stopped.
#[derive(Debug)]
pub enum RelayEnd {
    /// The source reached end of stream.
    Eof,
    /// The opposite direction closed the source connection.
    ClosedLocally,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
}

/// What a finished relay did.
#[derive(Debug)]
pub struct RelaySummary {
    pub end: RelayEnd,
    pub bytes_forwarded: u64,
    pub injections: u64,
}

/// Source half, destination half, and the close signals tying them to the
/// opposite direction.
pub struct Relay<R, W> {
    id: ConnectionId,
    direction: Direction,
    src: R,
    src_closed: CloseWatch,
    dst: W,
    dst_closer: CloseNotifier,
    bytes_forwarded: u64,
    injections: u64,
}

enum ReadEvent {
    Data(usize),
    Eof,
    /// Held bytes waited a full hold timeout without new data.
    Idle,
    Closed,
    Failed(io::Error),
}

impl<R, W> Relay<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        id: ConnectionId,
        direction: Direction,
        src: R,
        src_closed: CloseWatch,
        dst: W,
        dst_closer: CloseNotifier,
    ) -> Self {
        Self {
            id,
            direction,
            src,
            src_closed,
            dst,
            dst_closer,
            bytes_forwarded: 0,
            injections: 0,
        }
    }

    /// Copy everything from source to destination until either side fails.
    pub async fn copy_until_closed(mut self, buffer_capacity: usize) -> RelaySummary {
        let mut buf = vec![0u8; buffer_capacity];
        let end = loop {
            match self.read(&mut buf, None).await {
                ReadEvent::Data(n) => {
                    self.log_chunk(&buf[..n]);
                    if let Err(e) = self.write(&buf[..n]).await {
                        break RelayEnd::WriteFailed(e);
                    }
                }
                ReadEvent::Idle => continue,
                ReadEvent::Eof => break RelayEnd::Eof,
                ReadEvent::Closed => break RelayEnd::ClosedLocally,
                ReadEvent::Failed(e) => break RelayEnd::ReadFailed(e),
            }
        };
        self.finish(end).await
    }

    /// Copy like [`copy_until_closed`](Self::copy_until_closed), rewriting
    /// matching request lines on the way.
    pub async fn copy_rewriting(
        mut self,
        rewriter: &RequestRewriter,
        mut scan: ScanBuffer,
        hold_timeout: Duration,
    ) -> RelaySummary {
        let end = loop {
            if scan.is_full() {
                if let Err(e) = self.flush_held(rewriter, &mut scan).await {
                    break RelayEnd::WriteFailed(e);
                }
            }

            let idle = (!scan.is_empty()).then_some(hold_timeout);
            match self.read(scan.spare_mut(), idle).await {
                ReadEvent::Data(n) => {
                    scan.commit(n);
                    let window = scan.window();
                    self.log_chunk(&window[window.len() - n..]);
                    if let Err(e) = self.drain(rewriter, &mut scan).await {
                        break RelayEnd::WriteFailed(e);
                    }
                }
                ReadEvent::Idle => {
                    if let Err(e) = self.flush_held(rewriter, &mut scan).await {
                        break RelayEnd::WriteFailed(e);
                    }
                }
                ReadEvent::Eof => break self.flush_then(rewriter, &mut scan, RelayEnd::Eof).await,
                ReadEvent::Closed => {
                    break self
                        .flush_then(rewriter, &mut scan, RelayEnd::ClosedLocally)
                        .await
                }
                ReadEvent::Failed(e) => {
                    break self
                        .flush_then(rewriter, &mut scan, RelayEnd::ReadFailed(e))
                        .await
                }
            }
        };
        self.finish(end).await
    }

    async fn read(&mut self, buf: &mut [u8], idle: Option<Duration>) -> ReadEvent {
        let idle_timer = async move {
            match idle {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            res = self.src.read(buf) => match res {
                Ok(0) => ReadEvent::Eof,
                Ok(n) => ReadEvent::Data(n),
                Err(e) => ReadEvent::Failed(e),
            },
            _ = self.src_closed.closed() => ReadEvent::Closed,
            _ = idle_timer => ReadEvent::Idle,
        }
    }

    fn log_chunk(&self, chunk: &[u8]) {
        tracing::debug!(
            connection_id = %self.id,
            direction = %self.direction,
            payload = %String::from_utf8_lossy(chunk),
            "Relaying"
        );
    }

    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.dst.write_all(bytes).await?;
        self.dst.flush().await?;
        self.bytes_forwarded += bytes.len() as u64;
        Ok(())
    }

    /// Apply rewriter decisions until the window is empty or needs more bytes.
    async fn drain(&mut self, rewriter: &RequestRewriter, scan: &mut ScanBuffer) -> io::Result<()> {
        while !scan.is_empty() {
            let window = scan.window();
            match rewriter.decide(window, scan.is_full()) {
                Decision::Pass => {
                    self.write(window).await?;
                    scan.clear();
                }
                Decision::Hold => return Ok(()),
                Decision::Split { at } => {
                    self.write(&window[..at]).await?;
                    scan.consume(at);
                }
                Decision::Inject { line, consumed } => {
                    tracing::info!(
                        connection_id = %self.id,
                        platform = rewriter.platform(),
                        "Injected platform into image create request"
                    );
                    tracing::debug!(
                        connection_id = %self.id,
                        original = %String::from_utf8_lossy(&window[..consumed]),
                        rewritten = %String::from_utf8_lossy(&line),
                        "Rewrote request line"
                    );
                    self.write(&line).await?;
                    scan.consume(consumed);
                    self.injections += 1;
                }
                Decision::FailOpen { at, reason } => {
                    tracing::warn!(
                        connection_id = %self.id,
                        error = %reason,
                        line = %String::from_utf8_lossy(&window[..at]),
                        "Unable to inject platform, forwarding request as is"
                    );
                    self.write(&window[..at]).await?;
                    scan.consume(at);
                }
            }
        }
        Ok(())
    }

    /// Forward held bytes verbatim.
    async fn flush_held(&mut self, rewriter: &RequestRewriter, scan: &mut ScanBuffer) -> io::Result<()> {
        if scan.is_empty() {
            return Ok(());
        }
        let window = scan.window();
        if rewriter.looks_like_target(window) {
            tracing::warn!(
                connection_id = %self.id,
                held = window.len(),
                "Tried to inject request, but it's either incomplete or too long; forwarding as is"
            );
        } else {
            tracing::debug!(connection_id = %self.id, held = window.len(), "Forwarding held bytes");
        }
        self.write(window).await?;
        scan.clear();
        Ok(())
    }

    async fn flush_then(&mut self, rewriter: &RequestRewriter, scan: &mut ScanBuffer, end: RelayEnd) -> RelayEnd {
        match self.flush_held(rewriter, scan).await {
            Ok(()) => end,
            Err(e) => RelayEnd::WriteFailed(e),
        }
    }

    /// Log the outcome, close the destination and tell the opposite direction.
    async fn finish(mut self, end: RelayEnd) -> RelaySummary {
        match &end {
            RelayEnd::Eof => {
                tracing::info!(connection_id = %self.id, direction = %self.direction, "Source reached EOF")
            }
            RelayEnd::ClosedLocally => {
                tracing::debug!(connection_id = %self.id, direction = %self.direction, "Source closed by opposite direction")
            }
            RelayEnd::ReadFailed(e) | RelayEnd::WriteFailed(e) if is_benign_close(e) => {
                tracing::debug!(connection_id = %self.id, direction = %self.direction, error = %e, "Peer went away")
            }
            RelayEnd::ReadFailed(e) => {
                tracing::error!(connection_id = %self.id, direction = %self.direction, error = %e, "Error while reading from source")
            }
            RelayEnd::WriteFailed(e) => {
                tracing::error!(connection_id = %self.id, direction = %self.direction, error = %e, "Error while writing to destination")
            }
        }

        match self.dst.shutdown().await {
            Ok(()) => {
                tracing::info!(
                    connection_id = %self.id,
                    direction = %self.direction,
                    bytes = self.bytes_forwarded,
                    "Closed {}", self.direction
                )
            }
            Err(e) if is_benign_close(&e) => {
                tracing::debug!(connection_id = %self.id, direction = %self.direction, error = %e, "Destination already closed")
            }
            Err(e) => {
                tracing::error!(connection_id = %self.id, direction = %self.direction, error = %e, "Unable to close destination")
            }
        }
        self.dst_closer.close();

        RelaySummary {
            end,
            bytes_forwarded: self.bytes_forwarded,
            injections: self.injections,
        }
    }
}
