//! Outbound request and upstream response types.

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use hyper::body::Incoming;

use crate::upstream::body::UpstreamBody;
use crate::upstream::connection::Endpoint;
use crate::upstream::error::UpstreamError;

/// A request bound for the upstream, built once per exchange.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub path_and_query: PathAndQuery,
    pub headers: HeaderMap,
    pub body: Body,
}

impl OutboundRequest {
    pub fn new(method: Method, path_and_query: PathAndQuery, headers: HeaderMap, body: Body) -> Self {
        Self {
            method,
            path_and_query,
            headers,
            body,
        }
    }

    /// Build the origin-form HTTP/1.1 request sent on the wire.
    pub(crate) fn into_http(self, endpoint: &Endpoint) -> Result<Request<Body>, UpstreamError> {
        let mut request = Request::builder()
            .method(self.method)
            .uri(self.path_and_query)
            .body(self.body)
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        *request.headers_mut() = self.headers;

        if !request.headers().contains_key(HOST) {
            let host = HeaderValue::from_str(endpoint.authority())
                .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert(HOST, host);
        }
        Ok(request)
    }
}

/// Body of an upstream response; the representation is chosen by the entry
/// point that produced it and never changes afterwards.
#[derive(Debug)]
pub enum ResponseBody {
    /// Fully read into memory before the response was returned.
    Buffered(Bytes),
    /// Pulled chunk by chunk while relaying.
    Streaming(UpstreamBody<Incoming>),
}

/// Status, headers and body received from the upstream.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl UpstreamResponse {
    pub(crate) fn buffered(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Buffered(body),
        }
    }

    pub(crate) fn streaming(status: StatusCode, headers: HeaderMap, body: UpstreamBody<Incoming>) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Streaming(body),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Streaming(_))
    }

    /// Relay status, headers and body to the caller.
    ///
    /// Headers pass through unchanged, except that a buffered body which
    /// arrived chunked is re-framed with a `Content-Length`.
    pub fn into_response(self) -> Response {
        let mut headers = self.headers;
        let body = match self.body {
            ResponseBody::Buffered(bytes) => {
                if headers.remove(TRANSFER_ENCODING).is_some() {
                    headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
                }
                Body::from(bytes)
            }
            ResponseBody::Streaming(stream) => Body::new(stream),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HeaderName;
    use http_body_util::BodyExt;

    fn endpoint() -> Endpoint {
        Endpoint::parse("http://127.0.0.1:8081").unwrap()
    }

    #[test]
    fn adds_host_when_missing() {
        let outbound = OutboundRequest::new(Method::GET, PathAndQuery::from_static("/a?b=1"), HeaderMap::new(), Body::empty());
        let request = outbound.into_http(&endpoint()).unwrap();
        assert_eq!(request.uri(), "/a?b=1");
        assert_eq!(request.headers()[HOST], "127.0.0.1:8081");
    }

    #[test]
    fn keeps_inbound_host() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("proxy.local:5050"));
        headers.append(HeaderName::from_static("x-multi"), HeaderValue::from_static("1"));
        headers.append(HeaderName::from_static("x-multi"), HeaderValue::from_static("2"));

        let outbound = OutboundRequest::new(Method::GET, PathAndQuery::from_static("/"), headers, Body::empty());
        let request = outbound.into_http(&endpoint()).unwrap();
        assert_eq!(request.headers()[HOST], "proxy.local:5050");
        let values: Vec<_> = request.headers().get_all("x-multi").iter().collect();
        assert_eq!(values, ["1", "2"]);
    }

    #[tokio::test]
    async fn buffered_response_relays_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert("x-test", HeaderValue::from_static("1"));
        let upstream = UpstreamResponse::buffered(StatusCode::CREATED, headers, Bytes::from_static(b"hello world"));
        assert!(!upstream.is_streaming());

        let response = upstream.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-test"], "1");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "hello world");
    }

    #[tokio::test]
    async fn buffered_chunked_response_gets_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("x-test", HeaderValue::from_static("1"));
        let upstream = UpstreamResponse::buffered(StatusCode::OK, headers, Bytes::from_static(b"hello world"));

        let response = upstream.into_response();
        assert!(!response.headers().contains_key(TRANSFER_ENCODING));
        assert_eq!(response.headers()[CONTENT_LENGTH], "11");
        assert_eq!(response.headers()["x-test"], "1");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "hello world");
    }
}
