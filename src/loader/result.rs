//! Calling handlers under an abortable context and classifying their results.

use std::fmt;

use serde_json::Value;

use crate::deferred::DeferredData;
use crate::error::{ErrorResponse, RouteError};
use crate::loader::response::{RELOAD_DOCUMENT_HEADER, REVALIDATE_HEADER};
use crate::loader::{HandlerArgs, HandlerError, HandlerFn, HandlerOutput, HandlerResult, Response};
use crate::observability::metrics;
use crate::request::AbortableContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Loader,
    Action,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Loader => "loader",
            HandlerKind::Action => "action",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A redirect intercepted from a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectResult {
    pub status: u16,
    /// Raw Location value; resolved by the caller.
    pub location: String,
    pub revalidate: bool,
    pub reload_document: bool,
}

impl RedirectResult {
    fn from_response(resp: &Response) -> Option<Self> {
        if !resp.is_redirect() {
            return None;
        }
        Some(Self {
            status: resp.status.as_u16(),
            location: resp.location()?.to_string(),
            revalidate: resp.has_flag(REVALIDATE_HEADER),
            reload_document: resp.has_flag(RELOAD_DOCUMENT_HEADER),
        })
    }

    pub fn preserves_method(&self) -> bool {
        crate::loader::response::PRESERVE_METHOD_STATUS_CODES.contains(&self.status)
    }
}

/// A classified handler result.
#[derive(Debug, Clone)]
pub enum DataResult {
    Data(Value),
    Deferred(DeferredData),
    Redirect(RedirectResult),
    Error(RouteError),
}

impl DataResult {
    pub fn is_redirect(&self) -> bool {
        matches!(self, DataResult::Redirect(_))
    }

    fn outcome(&self) -> &'static str {
        match self {
            DataResult::Data(_) | DataResult::Deferred(_) => "ok",
            DataResult::Redirect(_) => "redirect",
            DataResult::Error(_) => "error",
        }
    }

    /// Cancel a deferred payload that will never be used.
    pub(crate) fn discard(self) {
        if let DataResult::Deferred(data) = self {
            data.cancel();
        }
    }

    /// Collapse a deferred payload into plain data by awaiting every key.
    pub(crate) async fn resolve_deferred(self) -> DataResult {
        match self {
            DataResult::Deferred(data) => match data.resolve_data().await {
                Ok(value) => DataResult::Data(value),
                Err(error) => DataResult::Error(error),
            },
            other => other,
        }
    }
}

fn classify(result: HandlerResult) -> DataResult {
    match result {
        Ok(HandlerOutput::Data(value)) => DataResult::Data(value),
        Ok(HandlerOutput::Deferred(data)) => DataResult::Deferred(data),
        Ok(HandlerOutput::Response(resp)) => match RedirectResult::from_response(&resp) {
            Some(redirect) => DataResult::Redirect(redirect),
            None => DataResult::Data(resp.body),
        },
        Err(HandlerError::Thrown(resp)) => match RedirectResult::from_response(&resp) {
            Some(redirect) => DataResult::Redirect(redirect),
            None => DataResult::Error(RouteError::Response(ErrorResponse::new(resp.status, resp.body))),
        },
        Err(HandlerError::Error(message)) => DataResult::Error(RouteError::Error(message)),
    }
}

/// Run `handler` on the runtime and wait for it or for `ctx` to be cancelled.
///
/// Returns `None` when the context was cancelled first; the handler keeps
/// running detached and any deferred payload it produces is cancelled.
pub(crate) async fn call_handler(
    kind: HandlerKind,
    route_id: &str,
    handler: &HandlerFn,
    args: HandlerArgs,
    ctx: &AbortableContext,
) -> Option<DataResult> {
    let mut handle = tokio::spawn(handler(args));

    let joined = tokio::select! {
        biased;
        _ = ctx.cancelled() => None,
        joined = &mut handle => Some(joined),
    };

    let Some(joined) = joined.filter(|_| !ctx.is_cancelled()) else {
        tracing::debug!(kind = %kind, route_id = %route_id, "Handler result discarded after cancel");
        metrics::record_handler_call(kind.as_str(), "cancelled");
        tokio::spawn(async move {
            if let Ok(Ok(HandlerOutput::Deferred(data))) = handle.await {
                data.cancel();
            }
        });
        return None;
    };

    let result = match joined {
        Ok(result) => classify(result),
        Err(join_error) => {
            let message = if join_error.is_panic() {
                format!("{kind} for route \"{route_id}\" panicked")
            } else {
                format!("{kind} for route \"{route_id}\" was aborted")
            };
            DataResult::Error(RouteError::Error(message))
        }
    };

    if let DataResult::Error(error) = &result {
        tracing::warn!(kind = %kind, route_id = %route_id, error = %error, "Handler failed");
    }
    if let DataResult::Deferred(data) = &result {
        data.abort_on(ctx.token());
    }
    metrics::record_handler_call(kind.as_str(), result.outcome());
    Some(result)
}
