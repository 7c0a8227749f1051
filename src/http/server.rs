//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Bind server to listener and serve until shutdown
//! - Dispatch requests to the buffered or streaming forwarder
//! - Cancel outstanding upstream work once the grace period expires
//! - Observability (metrics, correlation IDs)

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::forward::{buffered, streaming, ForwardMode};
use crate::http::headers::{translate, HopByHop};
use crate::http::request::{MakeRequestUuidV4, RequestIdExt, X_REQUEST_ID};
use crate::http::response::ProxyError;
use crate::observability::metrics;
use crate::routing::{Dispatcher, RouteMatch};
use crate::upstream::{OutboundRequest, UpstreamClient, UpstreamError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub upstream: Arc<UpstreamClient>,
    pub hop_by_hop: HopByHop,
    pub log_buffered_bodies: bool,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    upstream: Arc<UpstreamClient>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Builds the one upstream client shared by every request.
    pub fn new(config: ProxyConfig) -> Result<Self, UpstreamError> {
        let upstream = Arc::new(UpstreamClient::new(&config.upstream, &config.timeouts)?);
        let dispatcher = Arc::new(Dispatcher::from_config(&config.routes));

        let state = AppState {
            dispatcher,
            upstream: upstream.clone(),
            hop_by_hop: HopByHop::from_config(&config.headers),
            log_buffered_bodies: config.observability.log_buffered_bodies,
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            config,
            upstream,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %request.request_id(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID));

        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(middleware)
    }

    /// Run the server, accepting connections on the given listener until a
    /// shutdown signal arrives.
    ///
    /// In-flight requests get `shutdown_grace_secs` to finish; after that the
    /// upstream client is shut down, which cancels whatever is still waiting.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.upstream.endpoint(),
            "HTTP server starting"
        );

        let upstream = self.upstream.clone();
        let grace = self.config.timeouts.shutdown_grace();
        let (grace_tx, grace_rx) = tokio::sync::oneshot::channel::<tokio::task::JoinHandle<()>>();

        let signal = async move {
            let _ = shutdown.recv().await;
            tracing::info!(grace = ?grace, "Draining in-flight requests");
            let deadline = tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                tracing::warn!("Grace period expired, cancelling upstream exchanges");
                upstream.shutdown();
            });
            let _ = grace_tx.send(deadline);
        };

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await?;

        if let Ok(deadline) = grace_rx.await {
            deadline.abort();
        }
        self.upstream.shutdown();

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The shared upstream client.
    pub fn upstream(&self) -> &Arc<UpstreamClient> {
        &self.upstream
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Main proxy handler.
/// Dispatches the request, forwards it upstream, and records the outcome.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request.request_id().to_string();

    let route = match state.dispatcher.dispatch(request.method(), request.uri()) {
        Ok(route) => route,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request rejected");
            let response = ProxyError::from(e).into_response();
            metrics::record_request("none", response.status().as_u16(), start);
            return response;
        }
    };

    let mode = route.mode;
    let response = match forward(&state, route, request).await {
        Ok(response) => response,
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::error!(request_id = %request_id, mode = %mode, status = %status, error = %e, "Upstream request failed");
            } else {
                tracing::warn!(request_id = %request_id, mode = %mode, status = %status, error = %e, "Request rejected");
            }
            e.into_response()
        }
    };

    metrics::record_request(mode.as_str(), response.status().as_u16(), start);
    metrics::record_pool(&state.upstream.pool_status());
    response
}

async fn forward(state: &AppState, route: RouteMatch, request: Request<Body>) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();

    let path_and_query = state.upstream.endpoint().join(&route.path, route.query.as_deref())?;
    let headers = translate(&parts.headers, state.hop_by_hop);
    let outbound = OutboundRequest::new(parts.method, path_and_query, headers, body);

    tracing::debug!(mode = %route.mode, target = %outbound.path_and_query, "Forwarding request");

    match route.mode {
        ForwardMode::Buffered => buffered::forward(&state.upstream, outbound, state.log_buffered_bodies).await,
        ForwardMode::Streaming => streaming::forward(&state.upstream, outbound).await,
    }
}
