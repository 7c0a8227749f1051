//! Upstream client with buffered and streaming entry points.
//!
//! Both entry points share the same initial phase (lease a connection, send
//! the request, wait for the response head). They differ only in what happens
//! to the body: `request_buffered` drains it off the wire before returning,
//! `request_streaming` hands it back as a lazy chunk sequence.

use std::future::Future;
use std::time::Duration;

use bytes::BytesMut;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::Response;
use tokio_util::sync::CancellationToken;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::upstream::body::UpstreamBody;
use crate::upstream::connection::Endpoint;
use crate::upstream::error::{Phase, UpstreamError};
use crate::upstream::message::{OutboundRequest, UpstreamResponse};
use crate::upstream::pool::{ConnectionLease, ConnectionPool, PoolStatus};

/// Client for the single fixed upstream.
///
/// Constructed once at startup and shared by every forwarder; `shutdown`
/// must be called at teardown to cancel outstanding work and drain the pool.
#[derive(Debug)]
pub struct UpstreamClient {
    endpoint: Endpoint,
    pool: ConnectionPool,
    read_timeout: Duration,
    max_buffered_body: usize,
    cancel: CancellationToken,
}

impl UpstreamClient {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> Result<Self, UpstreamError> {
        let endpoint = Endpoint::parse(&upstream.base_uri)?;
        let pool = ConnectionPool::new(endpoint.clone(), upstream.max_connections, timeouts.connect());

        tracing::info!(
            upstream = %endpoint,
            max_connections = upstream.max_connections,
            connect_timeout = ?timeouts.connect(),
            read_timeout = ?timeouts.read(),
            "Upstream client initialized"
        );

        Ok(Self {
            endpoint,
            pool,
            read_timeout: timeouts.read(),
            max_buffered_body: upstream.max_buffered_body_bytes,
            cancel: CancellationToken::new(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Issue the request and read the whole body into memory before returning.
    ///
    /// The connection is held until the last byte is read, then returned to
    /// the pool.
    pub async fn request_buffered(&self, request: OutboundRequest) -> Result<UpstreamResponse, UpstreamError> {
        let token = self.cancel.child_token();
        let (response, lease) = self.exchange(&token, request).await?;
        let (parts, mut body) = response.into_parts();

        let mut buffer = BytesMut::new();
        loop {
            let next = self
                .bounded(&token, Phase::Body, async {
                    body.frame().await.transpose().map_err(UpstreamError::protocol)
                })
                .await?;
            let Some(frame) = next else { break };
            if let Ok(data) = frame.into_data() {
                if buffer.len() + data.len() > self.max_buffered_body {
                    return Err(UpstreamError::BodyTooLarge {
                        limit: self.max_buffered_body,
                    });
                }
                buffer.extend_from_slice(&data);
            }
        }
        lease.release();

        tracing::debug!(status = %parts.status, body_bytes = buffer.len(), "Upstream body buffered");
        Ok(UpstreamResponse::buffered(parts.status, parts.headers, buffer.freeze()))
    }

    /// Issue the request and return as soon as the response head arrives.
    ///
    /// The body is pulled lazily; mid-stream failures surface as a terminal
    /// error frame instead of failing this call.
    pub async fn request_streaming(&self, request: OutboundRequest) -> Result<UpstreamResponse, UpstreamError> {
        let token = self.cancel.child_token();
        let (response, lease) = self.exchange(&token, request).await?;
        let (parts, body) = response.into_parts();

        let body = UpstreamBody::new(body, Some(lease), self.read_timeout, token);
        Ok(UpstreamResponse::streaming(parts.status, parts.headers, body))
    }

    /// Cancel outstanding exchanges and close the pool. Idempotent.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            let status = self.pool.status();
            tracing::info!(in_use = status.in_use, idle = status.idle, "Shutting down upstream client");
        }
        self.cancel.cancel();
        self.pool.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Lease a connection and wait for the response head.
    async fn exchange(
        &self,
        token: &CancellationToken,
        request: OutboundRequest,
    ) -> Result<(Response<Incoming>, ConnectionLease), UpstreamError> {
        let request = request.into_http(&self.endpoint)?;

        let mut lease = tokio::select! {
            biased;
            () = token.cancelled() => return Err(UpstreamError::ShuttingDown),
            lease = self.pool.acquire() => lease?,
        };

        tracing::debug!(
            connection_id = %lease.id(),
            method = %request.method(),
            uri = %request.uri(),
            "Sending upstream request"
        );

        let response = self.bounded(token, Phase::Headers, lease.send_request(request)).await?;
        Ok((response, lease))
    }

    /// Run one suspension point under the read timeout and the cancellation token.
    async fn bounded<T>(
        &self,
        token: &CancellationToken,
        phase: Phase,
        fut: impl Future<Output = Result<T, UpstreamError>>,
    ) -> Result<T, UpstreamError> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(UpstreamError::Cancelled),
            result = tokio::time::timeout(self.read_timeout, fut) => match result {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout {
                    phase,
                    after: self.read_timeout,
                }),
            },
        }
    }
}

impl Drop for UpstreamClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::uri::PathAndQuery;
    use axum::http::{HeaderMap, Method};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every connection with a fixed raw HTTP/1.1 response.
    async fn raw_upstream(response: &'static str) -> String {
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

    fn client(base_uri: String, max_buffered: usize) -> UpstreamClient {
        let upstream = UpstreamConfig {
            base_uri,
            max_connections: 2,
            max_buffered_body_bytes: max_buffered,
        };
        let timeouts = TimeoutConfig {
            connect_ms: 500,
            read_ms: 500,
            shutdown_grace_secs: 1,
        };
        UpstreamClient::new(&upstream, &timeouts).unwrap()
    }

    fn get() -> OutboundRequest {
        OutboundRequest::new(Method::GET, PathAndQuery::from_static("/"), HeaderMap::new(), Body::empty())
    }

    #[tokio::test]
    async fn buffered_reads_whole_body() {
        let base = raw_upstream("HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world").await;
        let client = client(base, 1024);

        let response = client.request_buffered(get()).await.unwrap();
        assert!(!response.is_streaming());
        assert_eq!(response.status, 200);
        match response.body {
            crate::upstream::ResponseBody::Buffered(bytes) => assert_eq!(bytes, "hello world"),
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(client.pool_status().available, 2);
    }

    #[tokio::test]
    async fn buffered_enforces_limit() {
        let base = raw_upstream("HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world").await;
        let client = client(base, 4);

        let err = client.request_buffered(get()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::BodyTooLarge { limit: 4 }), "{:?}", err);
        assert_eq!(client.pool_status().available, 2);
    }

    #[tokio::test]
    async fn buffered_premature_close_is_upstream_error() {
        let base = raw_upstream("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial").await;
        let client = client(base, 1024);

        let err = client.request_buffered(get()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Upstream(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn streaming_returns_at_head() {
        let base = raw_upstream("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nchunk").await;
        let client = client(base, 1024);

        let response = client.request_streaming(get()).await.unwrap();
        assert!(response.is_streaming());
        assert_eq!(client.pool_status().in_use, 1, "lease held by the body");

        let body = response.into_response().into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "chunk");
        assert_eq!(client.pool_status().in_use, 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_exchanges() {
        let base = raw_upstream("HTTP/1.1 204 No Content\r\n\r\n").await;
        let client = client(base, 1024);

        client.shutdown();
        assert!(client.is_shut_down());
        let err = client.request_buffered(get()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::ShuttingDown), "{:?}", err);
    }
}
