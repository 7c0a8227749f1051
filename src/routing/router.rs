//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store the two static routes (buffered, streaming)
//! - Select exactly one forwarder for a request
//! - Return an explicit error for unmatched paths and methods
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - The upstream target never depends on request content beyond the path remainder
//! - Explicit NotFound rather than silent default

use axum::http::{Method, Uri};
use thiserror::Error;

use crate::config::RouteConfig;
use crate::forward::ForwardMode;
use crate::routing::matcher::PathPrefixMatcher;

/// A static route bound to one forwarding mode.
#[derive(Debug, Clone)]
pub struct Route {
    pub mode: ForwardMode,
    matcher: PathPrefixMatcher,
}

impl Route {
    pub fn new(prefix: impl Into<String>, mode: ForwardMode) -> Self {
        Self {
            mode,
            matcher: PathPrefixMatcher::new(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Forwarder to use.
    pub mode: ForwardMode,
    /// Path remainder after the route prefix, always starting with `/`.
    pub path: String,
    /// Query string, forwarded unchanged.
    pub query: Option<String>,
}

/// Why a request could not be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no route matches path '{0}'")]
    NotFound(String),

    #[error("method {0} is not allowed on proxy routes")]
    MethodNotAllowed(Method),
}

/// Maps inbound requests to a forwarder.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: Vec<Route>,
}

impl Dispatcher {
    /// Build the dispatcher from configured prefixes.
    pub fn from_config(config: &RouteConfig) -> Self {
        Self::new(vec![
            Route::new(config.buffered_prefix.clone(), ForwardMode::Buffered),
            Route::new(config.streaming_prefix.clone(), ForwardMode::Streaming),
        ])
    }

    pub fn new(mut routes: Vec<Route>) -> Self {
        // Longest prefix first, so nested prefixes resolve deterministically.
        routes.sort_by(|a, b| b.prefix().len().cmp(&a.prefix().len()));
        for route in &routes {
            tracing::debug!(prefix = %route.prefix(), mode = %route.mode, "Route registered");
        }
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Select the forwarder for a request.
    pub fn dispatch(&self, method: &Method, uri: &Uri) -> Result<RouteMatch, DispatchError> {
        let path = uri.path();
        let (route, remainder) = self
            .routes
            .iter()
            .find_map(|route| route.matcher.strip(path).map(|rest| (route, rest)))
            .ok_or_else(|| DispatchError::NotFound(path.to_string()))?;

        if method != Method::GET && method != Method::HEAD {
            return Err(DispatchError::MethodNotAllowed(method.clone()));
        }

        Ok(RouteMatch {
            mode: route.mode,
            path: remainder.to_string(),
            query: uri.query().map(str::to_string),
        })
    }
}
