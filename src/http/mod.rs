//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID + trace layers)
//!     → [routing layer picks buffered or streaming forwarder]
//!     → headers.rs (copy inbound headers for the upstream request)
//!     → [forwarder talks to the upstream]
//!     → response.rs (map failures to status codes)
//!     → Send to client
//! ```

pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use headers::{translate, HopByHop};
pub use request::{MakeRequestUuidV4, RequestIdExt, X_REQUEST_ID};
pub use response::ProxyError;
pub use server::{AppState, HttpServer};
