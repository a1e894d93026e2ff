//! Caller identity for streaming sessions.

use axum::http::HeaderMap;

/// Header set by the authenticating proxy in front of this server.
pub const DEFAULT_USER_HEADER: &str = "x-user-id";

/// Maps an incoming request to the user it belongs to.
///
/// Token verification happens upstream; implementations only read the
/// verified identity.
pub trait IdentityResolver: Send + Sync {
    /// The caller's user id, or `None` if the request is unauthenticated.
    fn resolve(&self, headers: &HeaderMap) -> Option<String>;
}

/// Reads the user id from a single request header.
#[derive(Clone, Debug)]
pub struct HeaderIdentity {
    header: String,
}

impl HeaderIdentity {
    /// Resolve identity from `header`.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_USER_HEADER)
    }
}

impl IdentityResolver for HeaderIdentity {
    fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(self.header.as_str())?.to_str().ok()?.trim();
        (!value.is_empty()).then(|| value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        let _ = map.insert(name, HeaderValue::from_static(value));
        map
    }

    #[test]
    fn reads_default_header() {
        let id = HeaderIdentity::default();
        assert_eq!(id.resolve(&headers("x-user-id", " u42 ")).as_deref(), Some("u42"));
    }

    #[test]
    fn missing_or_blank_is_unauthenticated() {
        let id = HeaderIdentity::default();
        assert!(id.resolve(&HeaderMap::new()).is_none());
        assert!(id.resolve(&headers("x-user-id", "  ")).is_none());
    }

    #[test]
    fn custom_header() {
        let id = HeaderIdentity::new("x-forwarded-user");
        assert_eq!(
            id.resolve(&headers("x-forwarded-user", "bob")).as_deref(),
            Some("bob")
        );
        assert!(id.resolve(&headers("x-user-id", "bob")).is_none());
    }
}
