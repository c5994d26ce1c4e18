//! Which headers of the incoming request reach a remote source.

use http::HeaderMap;
use http::HeaderValue;
use http::header::ACCEPT;
use http::header::ACCEPT_ENCODING;
use http::header::AUTHORIZATION;
use http::header::CONNECTION;
use http::header::CONTENT_ENCODING;
use http::header::CONTENT_LENGTH;
use http::header::CONTENT_TYPE;
use http::header::HOST;
use http::header::HeaderName;
use http::header::PROXY_AUTHENTICATE;
use http::header::PROXY_AUTHORIZATION;
use http::header::TE;
use http::header::TRAILER;
use http::header::TRANSFER_ENCODING;
use http::header::UPGRADE;

// Headers from https://datatracker.ietf.org/doc/html/rfc2616#section-13.5.1
// These make no sense for the second hop. Content and host headers are set by
// the HTTP client for the outgoing request.
static RESERVED_HEADERS: [HeaderName; 14] = [
    CONNECTION,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
    CONTENT_LENGTH,
    CONTENT_TYPE,
    CONTENT_ENCODING,
    HOST,
    ACCEPT,
    ACCEPT_ENCODING,
    HeaderName::from_static("keep-alive"),
];

/// Header forwarding policy of a remote schema.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ForwardHeaders {
    /// Nothing is forwarded.
    #[default]
    None,
    /// Every header except hop-by-hop and content headers.
    All,
    /// Only the named headers.
    Named(Vec<HeaderName>),
}

impl ForwardHeaders {
    /// Copies the forwarded headers of `incoming` into `outgoing`.
    pub(crate) fn apply(&self, incoming: &HeaderMap, outgoing: &mut HeaderMap) {
        let forward = |name: &HeaderName| match self {
            ForwardHeaders::None => false,
            ForwardHeaders::All => true,
            ForwardHeaders::Named(names) => names.contains(name),
        };
        for name in incoming.keys() {
            if RESERVED_HEADERS.contains(name) || !forward(name) {
                continue;
            }
            for value in incoming.get_all(name) {
                outgoing.append(name.clone(), value.clone());
            }
        }
    }
}

/// Sets `Authorization: Bearer <token>`, replacing any forwarded value.
pub(crate) fn insert_bearer_token(headers: &mut HeaderMap, token: &str) {
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(value) => {
            headers.insert(AUTHORIZATION, value);
        }
        Err(_) => tracing::warn!("bearer token is not a valid header value and was not sent"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant", HeaderValue::from_static("acme"));
        headers.insert("x-request-id", HeaderValue::from_static("42"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer user"));
        headers.insert(HOST, HeaderValue::from_static("stitch.local"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers
    }

    #[test]
    fn all_skips_reserved_headers() {
        let mut outgoing = HeaderMap::new();
        ForwardHeaders::All.apply(&incoming(), &mut outgoing);
        assert_eq!(outgoing.len(), 3);
        assert_eq!(outgoing["x-tenant"], "acme");
        assert_eq!(outgoing[AUTHORIZATION], "Bearer user");
        assert!(!outgoing.contains_key(HOST));
        assert!(!outgoing.contains_key(CONTENT_LENGTH));
        assert!(!outgoing.contains_key(CONNECTION));
    }

    #[test]
    fn named_and_none() {
        let mut outgoing = HeaderMap::new();
        ForwardHeaders::Named(vec![HeaderName::from_static("x-tenant"), HOST])
            .apply(&incoming(), &mut outgoing);
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing["x-tenant"], "acme");

        let mut outgoing = HeaderMap::new();
        ForwardHeaders::None.apply(&incoming(), &mut outgoing);
        assert!(outgoing.is_empty());
    }

    #[test]
    fn bearer_token_replaces_authorization() {
        let mut outgoing = HeaderMap::new();
        ForwardHeaders::All.apply(&incoming(), &mut outgoing);
        insert_bearer_token(&mut outgoing, "service-token");
        assert_eq!(outgoing[AUTHORIZATION], "Bearer service-token");
    }
}
