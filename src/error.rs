//! Error taxonomy.
//!
//! # Responsibilities
//! - `RouterError`: infrastructure failures returned from the public API
//! - `RouteError`: application-visible errors recorded against routes
//! - `ErrorResponse`: a thrown structured response (status-aware)
//!
//! # Design Decisions
//! - A missing match is not an error here; it commits an empty state
//! - Route errors are cloneable values so they can live in published state
//! - Aborted deferreds are a distinct variant so they are never retried

use http::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::navigation::location::Location;

/// Errors returned by the router's public operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RouterError {
    /// The route tree is not well formed.
    #[error("invalid route `{route_id}`: {message}")]
    InvalidRoute { route_id: String, message: String },

    /// A URL could not be built or parsed.
    #[error("invalid URL `{0}`")]
    InvalidUrl(String),

    /// Redirect chain exceeded the configured limit.
    #[error("too many redirects (limit {limit})")]
    RedirectLimit { limit: u32 },

    /// The router was disposed.
    #[error("router has been disposed")]
    Disposed,
}

/// A thrown response carrying status information.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub data: Value,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, data: Value) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            data,
        }
    }

    /// 404 for an href that matched no route.
    pub fn not_found(pathname: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            Value::String(format!("No route matches URL \"{pathname}\"")),
        )
    }

    /// 405 for a submission to a route that declares no action.
    pub fn method_not_allowed(method: &http::Method, pathname: &str, route_id: &str) -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            Value::String(format!(
                "You made a {method} request to \"{pathname}\" but did not provide an action \
                 for route \"{route_id}\", so there is no way to handle the request."
            )),
        )
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.status_text)
    }
}

/// An error recorded against a route in router state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RouteError {
    /// A structured response thrown by a loader or action.
    #[error("{0}")]
    Response(ErrorResponse),

    /// Any other thrown error or rejected future.
    #[error("{0}")]
    Error(String),

    /// A deferred value whose owner was cancelled.
    #[error("deferred data aborted")]
    AbortedDeferred,
}

impl RouteError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RouteError::Response(resp) => Some(resp.status),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RouteError::AbortedDeferred)
    }
}

impl From<ErrorResponse> for RouteError {
    fn from(resp: ErrorResponse) -> Self {
        RouteError::Response(resp)
    }
}

impl From<String> for RouteError {
    fn from(message: String) -> Self {
        RouteError::Error(message)
    }
}

impl From<&str> for RouteError {
    fn from(message: &str) -> Self {
        RouteError::Error(message.to_string())
    }
}

/// An error that no route boundary absorbed.
#[derive(Debug, Clone, PartialEq)]
pub struct FatalError {
    /// Location the failed navigation was heading to.
    pub location: Location,
    /// Route whose loader or action failed, when known.
    pub route_id: Option<String>,
    pub error: FatalCause,
}

/// What made a navigation fail fatally.
#[derive(Debug, Clone, PartialEq)]
pub enum FatalCause {
    Route(RouteError),
    Router(RouterError),
}

impl std::fmt::Display for FatalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            FatalCause::Route(e) => write!(f, "unhandled route error at {}: {e}", self.location),
            FatalCause::Router(e) => write!(f, "navigation to {} failed: {e}", self.location),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_text() {
        let resp = ErrorResponse::new(StatusCode::BAD_REQUEST, Value::Null);
        assert_eq!(resp.status_text, "Bad Request");
        assert_eq!(resp.to_string(), "400 Bad Request");
    }

    #[test]
    fn test_route_error_status() {
        let err: RouteError = ErrorResponse::not_found("/nope").into();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(!err.is_aborted());
        assert!(RouteError::AbortedDeferred.is_aborted());
        assert_eq!(RouteError::Error("boom".into()).status(), None);
    }
}
