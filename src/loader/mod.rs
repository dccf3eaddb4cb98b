//! Loader and action execution.
//!
//! # Data Flow
//! ```text
//! Controller / fetcher manager
//!     → HandlerArgs { request (with abort signal), params }
//!     → result.rs::call_handler (spawned; raced against the context)
//!     → classify: Data | Deferred | Redirect | Error
//!     → caller applies redirect rules / boundaries / commit
//! ```
//!
//! # Design Decisions
//! - Handlers are `Send + 'static` boxed futures so they can run detached
//! - Cancellation never kills a handler; its late result is discarded
//! - A returned non-redirect `Response` is data; a thrown one is an error

pub mod response;
pub mod result;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::deferred::DeferredData;
use crate::error::ErrorResponse;
use crate::request::Request;
use crate::routing::Params;

pub use response::Response;
pub use result::{DataResult, HandlerKind, RedirectResult};

/// What a loader or action receives.
#[derive(Debug, Clone)]
pub struct HandlerArgs {
    pub request: Request,
    pub params: Params,
}

impl HandlerArgs {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A handler's successful return value.
#[derive(Debug, Clone)]
pub enum HandlerOutput {
    Data(Value),
    Deferred(DeferredData),
    Response(Response),
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        HandlerOutput::Data(value)
    }
}

impl From<DeferredData> for HandlerOutput {
    fn from(data: DeferredData) -> Self {
        HandlerOutput::Deferred(data)
    }
}

impl From<Response> for HandlerOutput {
    fn from(resp: Response) -> Self {
        HandlerOutput::Response(resp)
    }
}

/// A handler's failure.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// A thrown response; redirects are followed, anything else is an
    /// `ErrorResponse` at the nearest boundary.
    #[error("thrown response with status {}", .0.status)]
    Thrown(Response),

    #[error("{0}")]
    Error(String),
}

impl From<Response> for HandlerError {
    fn from(resp: Response) -> Self {
        HandlerError::Thrown(resp)
    }
}

impl From<ErrorResponse> for HandlerError {
    fn from(resp: ErrorResponse) -> Self {
        HandlerError::Thrown(Response::with_status(resp.status, resp.data))
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::Error(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::Error(message.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Error(err.to_string())
    }
}

pub type HandlerResult = Result<HandlerOutput, HandlerError>;

/// A loader or action.
pub type HandlerFn = Arc<dyn Fn(HandlerArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
