//! Upstream client subsystem.
//!
//! # Data Flow
//! ```text
//! OutboundRequest
//!     → client.rs (buffered or streaming entry point)
//!     → pool.rs (lease a connection, wait while at capacity)
//!     → connection.rs (HTTP/1.1 exchange on the leased connection)
//!     → Buffered: body drained off the wire, lease released, Bytes returned
//!     → Streaming: body.rs wraps the live body + lease, pulled by the caller
//! ```
//!
//! # Design Decisions
//! - One client instance per process, explicitly constructed and shut down
//! - Buffering happens at the wire, never over an already-streamed body
//! - Every exit path (success, error, cancellation, drop) returns the lease once

pub mod body;
pub mod client;
pub mod connection;
pub mod error;
pub mod message;
pub mod pool;

pub use body::UpstreamBody;
pub use client::UpstreamClient;
pub use connection::{ConnectionId, ConnectionState, Endpoint};
pub use error::{Phase, UpstreamError};
pub use message::{OutboundRequest, ResponseBody, UpstreamResponse};
pub use pool::{ConnectionLease, ConnectionPool, PoolStatus};
