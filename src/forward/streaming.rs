//! Streaming forwarder.
//!
//! The response head is relayed as soon as the upstream sends it; the body
//! follows chunk by chunk as the caller's connection asks for it. A failure
//! after the head went out can only abort the caller's connection.

use axum::response::Response;

use crate::http::response::ProxyError;
use crate::upstream::{OutboundRequest, UpstreamClient};

/// Forward `request` and relay the response incrementally.
pub async fn forward(client: &UpstreamClient, request: OutboundRequest) -> Result<Response, ProxyError> {
    let upstream = client.request_streaming(request).await?;
    tracing::debug!(status = %upstream.status, "Upstream response head received, streaming body");
    Ok(upstream.into_response())
}
