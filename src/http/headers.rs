//! Header translation between the inbound request and the upstream request.
//!
//! Headers are copied verbatim by default, including hop-by-hop headers. The
//! `Strip` policy removes the RFC 9110 hop-by-hop set and anything the
//! `Connection` header names.

use axum::http::header::{self, HeaderMap, HeaderName};

use crate::config::HeaderConfig;

/// Headers that only apply to a single transport hop.
const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
];

/// What to do with hop-by-hop headers when copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HopByHop {
    /// Copy every header as received.
    #[default]
    Preserve,
    /// Drop hop-by-hop headers.
    Strip,
}

impl HopByHop {
    pub fn from_config(config: &HeaderConfig) -> Self {
        if config.strip_hop_by_hop {
            HopByHop::Strip
        } else {
            HopByHop::Preserve
        }
    }
}

/// Copy inbound headers for the upstream request.
///
/// Multi-valued headers keep every value in their original order.
pub fn translate(inbound: &HeaderMap, policy: HopByHop) -> HeaderMap {
    match policy {
        HopByHop::Preserve => inbound.clone(),
        HopByHop::Strip => strip_hop_by_hop(inbound),
    }
}

fn strip_hop_by_hop(inbound: &HeaderMap) -> HeaderMap {
    let named: Vec<HeaderName> = inbound
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if HOP_BY_HOP.contains(name) || named.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
