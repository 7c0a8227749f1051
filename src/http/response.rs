//! Response handling and error mapping.
//!
//! # Responsibilities
//! - Map dispatch and upstream failures to caller-visible status codes
//! - Keep error bodies short and plain text
//!
//! # Design Decisions
//! - Upstream timeouts result in 504 Gateway Timeout
//! - Every other upstream failure before the head is sent is 502
//! - Failures after the head is sent abort the body instead (see `upstream::body`)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::routing::DispatchError;
use crate::upstream::UpstreamError;

/// Failure surfaced at the forwarder boundary.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ProxyError {
    /// Status code returned to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Dispatch(DispatchError::NotFound(_)) => StatusCode::NOT_FOUND,
            ProxyError::Dispatch(DispatchError::MethodNotAllowed(_)) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Upstream(err) => match err {
                UpstreamError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                UpstreamError::Connect { .. }
                | UpstreamError::Upstream(_)
                | UpstreamError::BodyTooLarge { .. } => StatusCode::BAD_GATEWAY,
                UpstreamError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                UpstreamError::ShuttingDown | UpstreamError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ProxyError::Dispatch(DispatchError::NotFound(_)) => "No matching route found",
            ProxyError::Dispatch(DispatchError::MethodNotAllowed(_)) => "Method not allowed",
            ProxyError::Upstream(err) => match err {
                UpstreamError::Timeout { .. } => "Upstream timed out",
                UpstreamError::Connect { .. } => "Upstream unreachable",
                UpstreamError::BodyTooLarge { .. } => "Upstream response too large",
                UpstreamError::Upstream(_) => "Upstream request failed",
                UpstreamError::InvalidRequest(_) => "Invalid request",
                UpstreamError::ShuttingDown | UpstreamError::Cancelled => "Proxy is shutting down",
            },
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.message()).into_response()
    }
}
