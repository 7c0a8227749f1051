//! Upstream endpoint identity and single-connection lifecycle.
//!
//! # Responsibilities
//! - Resolve the configured base URI into an endpoint (host, port, base path)
//! - Open HTTP/1.1 connections to that endpoint
//! - Track connection state (Idle → InUse → Idle | Closed)
//! - Generate unique connection IDs for tracing

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use url::Url;

use crate::upstream::error::UpstreamError;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough, IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream-{}", self.0)
    }
}

/// Liveness state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Parked in the pool, ready for the next exchange.
    Idle,
    /// Leased to exactly one exchange.
    InUse,
    /// Discarded; the underlying socket is being torn down.
    Closed,
}

/// The fixed upstream origin, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    authority: String,
    base_path: String,
}

impl Endpoint {
    /// Parse an absolute `http://` base URI.
    pub fn parse(base_uri: &str) -> Result<Self, UpstreamError> {
        let url = Url::parse(base_uri)
            .map_err(|e| UpstreamError::InvalidRequest(format!("invalid upstream URI '{}': {}", base_uri, e)))?;
        if url.scheme() != "http" {
            return Err(UpstreamError::InvalidRequest(format!(
                "unsupported upstream scheme '{}'",
                url.scheme()
            )));
        }
        let host_str = url
            .host_str()
            .ok_or_else(|| UpstreamError::InvalidRequest(format!("upstream URI '{}' has no host", base_uri)))?;
        let port = url.port_or_known_default().unwrap_or(80);

        Ok(Self {
            // IPv6 literals come bracketed from the URL; the resolver wants them bare.
            host: host_str.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
            authority: format!("{}:{}", host_str, port),
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, used as the `Host` header fallback and in logs.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Append a request path (leading `/`) and optional query to the base path.
    pub fn join(&self, path: &str, query: Option<&str>) -> Result<PathAndQuery, UpstreamError> {
        let mut target = String::with_capacity(self.base_path.len() + path.len() + 1);
        target.push_str(&self.base_path);
        if !path.starts_with('/') {
            target.push('/');
        }
        target.push_str(path);
        if let Some(query) = query {
            target.push('?');
            target.push_str(query);
        }
        PathAndQuery::try_from(target)
            .map_err(|e| UpstreamError::InvalidRequest(format!("invalid upstream path: {}", e)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}{}", self.authority, self.base_path)
    }
}

/// One HTTP/1.1 connection to the upstream.
///
/// The hyper connection task runs detached; dropping the sender tears it down.
#[derive(Debug)]
pub struct UpstreamConnection {
    id: ConnectionId,
    sender: http1::SendRequest<Body>,
    state: ConnectionState,
}

impl UpstreamConnection {
    /// Open a TCP connection and complete the HTTP/1.1 handshake.
    pub(crate) async fn open(endpoint: &Endpoint) -> Result<Self, UpstreamError> {
        let stream = TcpStream::connect((endpoint.host(), endpoint.port()))
            .await
            .map_err(|source| UpstreamError::Connect {
                authority: endpoint.authority().to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY on upstream socket");
        }

        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(UpstreamError::protocol)?;

        let id = ConnectionId::new();
        tokio::spawn(async move {
            match connection.await {
                Ok(()) => tracing::trace!(connection_id = %id, "Upstream connection closed"),
                Err(e) => tracing::debug!(connection_id = %id, error = %e, "Upstream connection closed with error"),
            }
        });

        tracing::debug!(connection_id = %id, upstream = %endpoint.authority(), "Opened upstream connection");
        Ok(Self {
            id,
            sender,
            state: ConnectionState::Idle,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// True once the upstream or the connection task has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Wait until the connection can accept another request.
    pub(crate) async fn ready(&mut self) -> Result<(), hyper::Error> {
        self.sender.ready().await
    }

    pub(crate) async fn send(&mut self, request: Request<Body>) -> Result<Response<Incoming>, hyper::Error> {
        self.sender.send_request(request).await
    }
}
