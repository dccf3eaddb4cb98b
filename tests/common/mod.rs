//! Shared helpers for router integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use http::StatusCode;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, Notify};

use data_router::navigation::DocumentNavigator;
use data_router::request::Request;
use data_router::{
    HandlerArgs, HandlerError, HandlerOutput, HandlerResult, MemoryHistory, Response, Router, RouteDef,
    RouterState,
};

const WAIT: Duration = Duration::from_secs(2);

/// A loader/action whose calls park until the test settles them.
#[derive(Clone, Default)]
pub struct Controlled {
    inner: Arc<ControlledInner>,
}

#[derive(Default)]
struct ControlledInner {
    calls: Mutex<Vec<Call>>,
    notify: Notify,
}

struct Call {
    args: HandlerArgs,
    tx: Option<oneshot::Sender<HandlerResult>>,
}

impl Controlled {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self) -> impl Fn(HandlerArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static {
        let inner = self.inner.clone();
        move |args: HandlerArgs| {
            let (tx, rx) = oneshot::channel();
            inner.calls.lock().push(Call { args, tx: Some(tx) });
            inner.notify.notify_waiters();
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(HandlerError::Error("call dropped".into())))
            }
            .boxed()
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.lock().len()
    }

    /// Wait until at least `n` calls were made.
    pub async fn wait_calls(&self, n: usize) {
        tokio::time::timeout(WAIT, async {
            loop {
                let notified = self.inner.notify.notified();
                if self.calls() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {n} calls, saw {}", self.calls()));
    }

    pub fn request(&self, index: usize) -> Request {
        self.inner.calls.lock()[index].args.request.clone()
    }

    pub fn args(&self, index: usize) -> HandlerArgs {
        self.inner.calls.lock()[index].args.clone()
    }

    pub fn resolve(&self, index: usize, result: HandlerResult) {
        let tx = self.inner.calls.lock()[index].tx.take();
        if let Some(tx) = tx {
            let _ = tx.send(result);
        }
    }

    pub fn resolve_data(&self, index: usize, value: Value) {
        self.resolve(index, Ok(HandlerOutput::Data(value)));
    }
}

/// A handler that answers immediately with `value` and counts its calls.
pub fn counting(value: Value) -> (impl Fn(HandlerArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let handler = move |_: HandlerArgs| {
        counter.fetch_add(1, Ordering::SeqCst);
        let value = value.clone();
        async move { Ok(HandlerOutput::Data(value)) }.boxed()
    };
    (handler, count)
}

/// Echoes the request method and URL path back as data.
pub async fn echo(args: HandlerArgs) -> HandlerResult {
    Ok(HandlerOutput::Data(serde_json::json!({
        "method": args.request.method.as_str(),
        "path": args.request.url.path(),
        "params": args.params,
    })))
}

pub fn router(routes: Vec<RouteDef>, entries: &[&str]) -> Router {
    router_with_history(routes, entries).0
}

/// Like `router`, keeping a handle on the history stack.
pub fn router_with_history(routes: Vec<RouteDef>, entries: &[&str]) -> (Router, Arc<MemoryHistory>) {
    let history = Arc::new(MemoryHistory::new(entries));
    let router = Router::builder()
        .routes(routes)
        .history(history.clone())
        .build()
        .expect("router builds");
    (router, history)
}

pub fn data(value: Value) -> HandlerResult {
    Ok(HandlerOutput::Data(value))
}

/// A thrown non-redirect response.
pub fn thrown(status: StatusCode, body: Value) -> HandlerResult {
    Err(HandlerError::Thrown(Response::with_status(status, body)))
}

pub fn failed(message: &str) -> HandlerResult {
    Err(HandlerError::Error(message.to_string()))
}

pub fn redirect(to: &str) -> HandlerResult {
    respond(Response::redirect(to))
}

pub fn respond(response: Response) -> HandlerResult {
    Ok(HandlerOutput::Response(response))
}

/// Wait for a published state satisfying `pred`.
pub async fn wait_for(router: &Router, pred: impl Fn(&RouterState) -> bool) -> Arc<RouterState> {
    let mut rx = router.subscribe();
    tokio::time::timeout(WAIT, async {
        loop {
            let state = rx.borrow_and_update().clone();
            if pred(&state) {
                return state;
            }
            if rx.changed().await.is_err() {
                panic!("router dropped");
            }
        }
    })
    .await
    .expect("state never matched")
}

/// Records external redirects.
#[derive(Default)]
pub struct RecordingDocument {
    pub visits: Mutex<Vec<(String, bool)>>,
}

impl DocumentNavigator for RecordingDocument {
    fn navigate(&self, href: &str, replace: bool) {
        self.visits.lock().push((href.to_string(), replace));
    }
}
