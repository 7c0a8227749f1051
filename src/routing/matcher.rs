//! Route matching logic.
//!
//! # Responsibilities
//! - Match a route prefix followed by at most one path segment
//! - Return the path remainder to forward upstream
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `/proxy` matches `/proxy`, `/proxy/` and `/proxy/a`
//! - `/proxy-stream`, `/proxyx` and `/proxy/a/b` do not match
//! - No regex to guarantee O(n) matching

/// Matches the request path against a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Strip the prefix, returning the remainder as an absolute path.
    ///
    /// The remainder is either empty or a single segment. Returns `None`
    /// when the path is outside this prefix or nests deeper.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        match path.strip_prefix(self.prefix.as_str())? {
            "" | "/" => Some("/"),
            rest => {
                let segment = rest.strip_prefix('/')?;
                if segment.contains('/') {
                    None
                } else {
                    Some(rest)
                }
            }
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.strip(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/proxy");

        assert_eq!(matcher.strip("/proxy"), Some("/"));
        assert_eq!(matcher.strip("/proxy/"), Some("/"));
        assert_eq!(matcher.strip("/proxy/anything"), Some("/anything"));
        assert_eq!(matcher.strip("/proxy/a.txt"), Some("/a.txt"));
    }

    #[test]
    fn test_segment_boundary() {
        let matcher = PathPrefixMatcher::new("/proxy");

        assert!(!matcher.matches("/proxy-stream"));
        assert!(!matcher.matches("/proxyx/a"));
        assert!(!matcher.matches("/PROXY"));
        assert!(!matcher.matches("/"));
        assert!(!matcher.matches("/other/proxy"));
    }

    #[test]
    fn test_single_segment_only() {
        let matcher = PathPrefixMatcher::new("/proxy");

        assert_eq!(matcher.strip("/proxy/a/b"), None);
        assert_eq!(matcher.strip("/proxy/a/"), None);
        assert_eq!(matcher.strip("/proxy//"), None);
    }
}
