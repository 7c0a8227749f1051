//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, pool ceiling > 0)
//! - Check the upstream base URI is a plain `http://` origin
//! - Detect conflicting route prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("upstream.base_uri: {0}")]
    InvalidUpstream(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field}: '{value}' must start with '/' and must not end with '/'")]
    InvalidPrefix { field: &'static str, value: String },

    #[error("routes: prefixes '{0}' and '{1}' overlap")]
    OverlappingPrefixes(String, String),

    #[error("observability.log_level: '{0}' is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if let Err(reason) = check_upstream(&config.upstream.base_uri) {
        errors.push(ValidationError::InvalidUpstream(reason));
    }

    if config.upstream.max_connections == 0 {
        errors.push(ValidationError::Zero("upstream.max_connections"));
    }
    if config.upstream.max_buffered_body_bytes == 0 {
        errors.push(ValidationError::Zero("upstream.max_buffered_body_bytes"));
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_ms"));
    }
    if config.timeouts.read_ms == 0 {
        errors.push(ValidationError::Zero("timeouts.read_ms"));
    }

    let buffered = &config.routes.buffered_prefix;
    let streaming = &config.routes.streaming_prefix;
    let buffered_ok = check_prefix(&mut errors, "routes.buffered_prefix", buffered);
    let streaming_ok = check_prefix(&mut errors, "routes.streaming_prefix", streaming);
    if buffered_ok && streaming_ok && overlaps(buffered, streaming) {
        errors.push(ValidationError::OverlappingPrefixes(buffered.clone(), streaming.clone()));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::InvalidLogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_upstream(base_uri: &str) -> Result<(), String> {
    let url = Url::parse(base_uri).map_err(|e| format!("'{}' is not a valid URI: {}", base_uri, e))?;
    if url.scheme() != "http" {
        return Err(format!("scheme '{}' is not supported, only http", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err(format!("'{}' has no host", base_uri));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(format!("'{}' must not carry a query or fragment", base_uri));
    }
    Ok(())
}

fn check_prefix(errors: &mut Vec<ValidationError>, field: &'static str, prefix: &str) -> bool {
    let valid = prefix.starts_with('/') && prefix.len() > 1 && !prefix.ends_with('/');
    if !valid {
        errors.push(ValidationError::InvalidPrefix {
            field,
            value: prefix.to_string(),
        });
    }
    valid
}

/// Two prefixes overlap when one matches a path the other also matches.
fn overlaps(a: &str, b: &str) -> bool {
    let nested = |outer: &str, inner: &str| {
        inner == outer || inner.strip_prefix(outer).is_some_and(|rest| rest.starts_with('/'))
    };
    nested(a, b) || nested(b, a)
}
