//! Minimal HTTP reverse proxy with buffered and streaming forwarding.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────┐
//!                          │                   RELAY PROXY                    │
//!                          │                                                  │
//!     Client Request       │  ┌─────────┐    ┌──────────┐    ┌────────────┐   │
//!     ─────────────────────┼─▶│  http   │───▶│ routing  │───▶│  forward   │   │
//!                          │  │ server  │    │dispatcher│    │ buffered / │   │
//!                          │  └─────────┘    └──────────┘    │ streaming  │   │
//!                          │                                 └─────┬──────┘   │
//!                          │                                       ▼          │
//!     Client Response      │                                 ┌────────────┐   │
//!     ◀────────────────────┼─────────────────────────────────│  upstream  │◀──┼──── Upstream
//!                          │                                 │client+pool │   │     Server
//!                          │                                 └────────────┘   │
//!                          │  ┌────────────────────────────────────────────┐  │
//!                          │  │ config · observability · lifecycle         │  │
//!                          │  └────────────────────────────────────────────┘  │
//!                          └──────────────────────────────────────────────────┘
//! ```
//!
//! `GET /proxy/...` reads the upstream response fully before relaying it;
//! `GET /proxy-stream/...` relays it chunk by chunk as the caller consumes it.

// Core subsystems
pub mod config;
pub mod forward;
pub mod http;
pub mod routing;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use upstream::UpstreamClient;
