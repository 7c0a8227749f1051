//! Buffered forwarder.
//!
//! Nothing reaches the caller until the upstream body has been read in
//! full, which makes the response available for inspection and logging. The
//! upstream connection and the buffer are held for the whole round trip, so
//! under load the pool ceiling becomes the bottleneck.

use axum::response::Response;

use crate::http::response::ProxyError;
use crate::upstream::{OutboundRequest, ResponseBody, UpstreamClient};

/// Forward `request` and relay the fully materialized response.
pub async fn forward(client: &UpstreamClient, request: OutboundRequest, log_body: bool) -> Result<Response, ProxyError> {
    let upstream = client.request_buffered(request).await?;

    if log_body {
        if let ResponseBody::Buffered(body) = &upstream.body {
            tracing::debug!(
                status = %upstream.status,
                body = %String::from_utf8_lossy(body),
                "Buffered upstream response"
            );
        }
    }

    Ok(upstream.into_response())
}
