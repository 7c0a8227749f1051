//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use futures_util::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use relay_proxy::config::ProxyConfig;
use relay_proxy::http::HttpServer;
use relay_proxy::lifecycle::Shutdown;
use relay_proxy::UpstreamClient;

/// Serve `app` on an ephemeral port and return its base URI.
pub async fn serve_upstream(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Upstream answering every path with `200 OK`, `X-Test: 1`, `hello world`.
pub fn fixed_upstream() -> Router {
    Router::new().fallback(|| async { ([("x-test", "1")], "hello world") })
}

/// Upstream echoing the path, query and request ID it received.
pub fn echo_upstream() -> Router {
    Router::new().fallback(|uri: Uri, headers: HeaderMap| async move {
        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        ([("x-seen-request-id", request_id)], uri.to_string())
    })
}

/// Upstream that accepts the request and never answers.
pub fn silent_upstream() -> Router {
    Router::new().fallback(|| async {
        std::future::pending::<()>().await;
        "unreachable"
    })
}

/// Upstream whose single response body is fed chunk by chunk by the test.
///
/// Dropping the returned sender ends the body.
pub fn gated_upstream() -> (Router, mpsc::UnboundedSender<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    let slot = Arc::new(Mutex::new(Some(rx)));

    let app = Router::new().fallback(move || {
        let slot = slot.clone();
        async move {
            let Some(rx) = slot.lock().unwrap().take() else {
                return (axum::http::StatusCode::CONFLICT, "gate already used").into_response();
            };
            let chunks = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
            });
            Response::new(Body::from_stream(chunks))
        }
    });
    (app, tx)
}

/// Tracks how many upstream requests are in flight at once.
#[derive(Debug, Default)]
pub struct Concurrency {
    current: AtomicUsize,
    max: AtomicUsize,
    total: AtomicUsize,
}

impl Concurrency {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Upstream that holds each request for `delay` before answering `OK\n`.
pub fn slow_upstream(delay: Duration, concurrency: Arc<Concurrency>) -> Router {
    Router::new().fallback(move || {
        let concurrency = concurrency.clone();
        async move {
            concurrency.enter();
            tokio::time::sleep(delay).await;
            concurrency.exit();
            "OK\n"
        }
    })
}

/// Raw TCP upstream writing `response` verbatim, then closing the socket.
pub async fn raw_upstream(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}

/// Base URI of a port nothing listens on.
pub async fn unreachable_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Test-friendly configuration pointing at `base_uri`.
pub fn proxy_config(base_uri: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.base_uri = base_uri.to_string();
    config.upstream.max_connections = 4;
    config.timeouts.connect_ms = 500;
    config.timeouts.read_ms = 2_000;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// A running proxy instance.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub upstream: Arc<UpstreamClient>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Poll until no upstream lease is held, or `within` elapses.
    pub async fn wait_for_idle_pool(&self, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.upstream.pool_status().in_use == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.upstream.pool_status().in_use == 0
    }
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config).unwrap();
    let upstream = server.upstream().clone();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, rx));

    TestProxy {
        addr,
        upstream,
        shutdown,
        handle,
    }
}

/// HTTP client used as the caller.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
