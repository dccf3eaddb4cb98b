//! Response values loaders and actions return or throw.
//!
//! # Responsibilities
//! - Carry status, headers and a JSON body
//! - Build redirects (Location header, optional revalidate / reload flags)
//!
//! # Design Decisions
//! - Only 301/302/303/307/308 with a Location header count as redirects;
//!   300 and 304 pass through as ordinary results
//! - Location values are percent-encoded so non-ASCII targets stay valid

use http::header::LOCATION;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;

/// Statuses the router follows.
pub const REDIRECT_STATUS_CODES: [u16; 5] = [301, 302, 303, 307, 308];
/// Redirect statuses that keep the submission's method and body.
pub const PRESERVE_METHOD_STATUS_CODES: [u16; 2] = [307, 308];
/// Forces the post-redirect load to ignore `should_revalidate` opt-outs.
pub const REVALIDATE_HEADER: &str = "x-router-revalidate";
/// Forces the redirect to leave the application (document navigation).
pub const RELOAD_DOCUMENT_HEADER: &str = "x-router-reload-document";

// Characters that cannot appear in a header value as-is.
const LOCATION_ENCODE: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    /// 200 with a JSON body.
    pub fn json(body: Value) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    pub fn with_status(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// 302 to `to`.
    pub fn redirect(to: &str) -> Self {
        Self::redirect_with_status(to, StatusCode::FOUND)
    }

    pub fn redirect_with_status(to: &str, status: StatusCode) -> Self {
        let encoded = utf8_percent_encode(to, LOCATION_ENCODE).to_string();
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&encoded) {
            headers.insert(LOCATION, value);
        }
        Self {
            status,
            headers,
            body: Value::Null,
        }
    }

    /// 302 that always triggers a full document navigation.
    pub fn redirect_document(to: &str) -> Self {
        Self::redirect(to).header(RELOAD_DOCUMENT_HEADER, "true")
    }

    /// Mark a redirect as requiring revalidation of every active loader.
    pub fn with_revalidate(self) -> Self {
        self.header(REVALIDATE_HEADER, "true")
    }

    /// Set a header; invalid names or values are ignored with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Ignoring invalid response header"),
        }
        self
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn is_redirect(&self) -> bool {
        REDIRECT_STATUS_CODES.contains(&self.status.as_u16()) && self.location().is_some()
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redirect_headers() {
        let resp = Response::redirect("/next?x=1#h").with_revalidate();
        assert_eq!(resp.status, StatusCode::FOUND);
        assert_eq!(resp.location(), Some("/next?x=1#h"));
        assert!(resp.is_redirect());
        assert!(resp.has_flag(REVALIDATE_HEADER));
        assert!(!resp.has_flag(RELOAD_DOCUMENT_HEADER));
    }

    #[test]
    fn test_non_ascii_location_is_encoded() {
        let resp = Response::redirect("/café path");
        assert_eq!(resp.location(), Some("/caf%C3%A9%20path"));
    }

    #[test]
    fn test_300_and_304_are_not_redirects() {
        for status in [StatusCode::MULTIPLE_CHOICES, StatusCode::NOT_MODIFIED] {
            let resp = Response::redirect_with_status("/x", status);
            assert!(!resp.is_redirect());
        }
        assert!(!Response::json(json!(1)).is_redirect());
    }
}
