//! Forwarding strategies.
//!
//! # Data Flow
//! ```text
//! RouteMatch.mode
//!     → buffered.rs: request_buffered → whole response written in one pass
//!     → streaming.rs: request_streaming → head written, body relayed chunk by chunk
//! ```
//!
//! # Design Decisions
//! - Upstream failures stop at the forwarder boundary as a `ProxyError`
//! - Buffered mode holds its upstream connection for the whole round trip

pub mod buffered;
pub mod streaming;

use std::fmt;

/// Which forwarder handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardMode {
    /// Materialize the upstream response, then relay it.
    Buffered,
    /// Relay the upstream response as it arrives.
    Streaming,
}

impl ForwardMode {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardMode::Buffered => "buffered",
            ForwardMode::Streaming => "streaming",
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
