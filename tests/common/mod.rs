//! Shared utilities for integration tests.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docker_platformify::config::ProxyConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Fresh socket path under a per-process scratch directory.
pub fn socket_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("platformify-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Proxy configuration pointing at the given sockets.
pub fn proxy_config(upstream: &Path, proxy: &Path, platform: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.socket_path = upstream.to_path_buf();
    config.listener.socket_path = proxy.to_path_buf();
    config.rewrite.platform = platform.to_string();
    config.lifecycle.drain_timeout = Duration::from_millis(500);
    config
}

/// Connect, retrying while the proxy is still binding.
pub async fn connect(path: &Path) -> UnixStream {
    for _ in 0..100 {
        if let Ok(stream) = UnixStream::connect(path).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("proxy socket {} never came up", path.display());
}

/// Start a mock upstream that records each request head and answers with a
/// fixed body, then closes.
pub async fn start_recording_upstream(
    path: &Path,
    body: &'static str,
) -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();
    start_programmable_upstream(path, move |mut socket| {
        let tx = tx.clone();
        async move {
            let head = read_head(&mut socket).await;
            let _ = tx.send(head);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    })
    .await;
    rx
}

/// Start a mock upstream that hands every accepted connection to `f`.
pub async fn start_programmable_upstream<F, Fut>(path: &Path, f: F)
where
    F: Fn(UnixStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = UnixListener::bind(path).unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move { f(socket).await });
                }
                Err(_) => break,
            }
        }
    });
}

/// Read until the end of the header block or EOF.
pub async fn read_head(socket: &mut UnixStream) -> Vec<u8> {
    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    head
}

/// Counts error-level events.
pub struct ErrorCounter {
    errors: Arc<AtomicUsize>,
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Counts warn-level events.
pub struct WarnCounter {
    warnings: Arc<AtomicUsize>,
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Warn and error event totals seen by [`count_events`].
pub struct EventCounts {
    pub warnings: Arc<AtomicUsize>,
    pub errors: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl EventCounts {
    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

/// Install a thread-local subscriber counting warn and error events.
///
/// Only sees events from tasks polled on the current thread, which is every
/// task under the default `#[tokio::test]` runtime.
#[allow(dead_code)]
pub fn count_events() -> (EventCounts, tracing::subscriber::DefaultGuard) {
    let counts = EventCounts {
        warnings: Arc::new(AtomicUsize::new(0)),
        errors: Arc::new(AtomicUsize::new(0)),
    };
    let subscriber = tracing_subscriber::registry()
        .with(ErrorCounter {
            errors: counts.errors.clone(),
        })
        .with(WarnCounter {
            warnings: counts.warnings.clone(),
        });
    (counts, tracing::subscriber::set_default(subscriber))
}
