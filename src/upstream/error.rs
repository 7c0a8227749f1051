//! Upstream error taxonomy.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed error from hyper or an upstream body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Phase of an exchange during which a timeout expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// TCP connect and HTTP/1.1 handshake.
    Connect,
    /// Waiting for the status line and headers.
    Headers,
    /// Waiting for the next body chunk.
    Body,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Connect => f.write_str("connect"),
            Phase::Headers => f.write_str("response headers"),
            Phase::Body => f.write_str("response body"),
        }
    }
}

/// Errors that can occur while talking to the upstream.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream could not be reached.
    #[error("failed to connect to upstream {authority}: {source}")]
    Connect {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    /// No response or read progress within the configured bound.
    #[error("upstream timed out waiting for {phase} after {after:?}")]
    Timeout { phase: Phase, after: Duration },

    /// The upstream sent a malformed response or closed mid-response.
    #[error("upstream protocol error: {0}")]
    Upstream(#[source] BoxError),

    /// The buffered body exceeded the configured limit.
    #[error("upstream body exceeds buffer limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The outbound request could not be assembled.
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),

    /// The client was shut down before the exchange could start.
    #[error("upstream client is shutting down")]
    ShuttingDown,

    /// An in-flight exchange was cancelled by client shutdown.
    #[error("upstream exchange cancelled")]
    Cancelled,
}

impl UpstreamError {
    pub(crate) fn protocol(error: impl Into<BoxError>) -> Self {
        UpstreamError::Upstream(error.into())
    }

    /// Returns true if the error is a timeout in any phase.
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout { .. })
    }
}
