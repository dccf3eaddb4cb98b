//! Deferred loader data: a mix of ready ("critical") values and pending ones.
//!
//! # Responsibilities
//! - Run each pending future eagerly on the runtime
//! - Settle per-key slots and notify listeners as keys resolve
//! - Freeze everything on cancel: no later mutation, no later notification
//!
//! # Design Decisions
//! - Settlement and cancellation serialize on the pending-set lock, and
//!   listeners are called under it, so no notification can follow an abort
//! - Pending work is not dropped on cancel; its late result is ignored

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::deferred::value::DeferredValue;
use crate::error::RouteError;
use crate::observability::metrics;

/// One key of a deferred payload.
#[derive(Debug, Clone)]
pub enum DeferredEntry {
    Ready(Value),
    Pending(DeferredValue),
}

/// What a settle listener is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleEvent<'a> {
    /// `key` resolved or rejected.
    Settled { key: &'a str, done: bool },
    /// The whole payload was cancelled.
    Aborted,
}

pub type SettleListener = Arc<dyn Fn(SettleEvent<'_>) + Send + Sync>;

type PendingFuture = BoxFuture<'static, Result<Value, RouteError>>;

/// Start describing a deferred payload.
pub fn defer() -> DeferredBuilder {
    DeferredBuilder::default()
}

#[derive(Default)]
pub struct DeferredBuilder {
    ready: Vec<(String, Value)>,
    pending: Vec<(String, PendingFuture)>,
}

impl DeferredBuilder {
    /// A value available immediately.
    pub fn value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.ready.push((key.into(), value));
        self
    }

    /// A value that resolves after the navigation commits.
    pub fn pending<F, E>(mut self, key: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = Result<Value, E>> + Send + 'static,
        E: Into<RouteError>,
    {
        self.pending
            .push((key.into(), fut.map(|r| r.map_err(Into::into)).boxed()));
        self
    }

    /// Spawn the pending futures. Must be called inside a Tokio runtime.
    pub fn build(self) -> DeferredData {
        let mut entries = BTreeMap::new();
        let mut pending_keys = BTreeSet::new();
        let mut tasks = Vec::with_capacity(self.pending.len());

        for (key, value) in self.ready {
            entries.insert(key, DeferredEntry::Ready(value));
        }
        for (key, fut) in self.pending {
            let slot = DeferredValue::pending(key.clone());
            entries.insert(key.clone(), DeferredEntry::Pending(slot.clone()));
            pending_keys.insert(key);
            tasks.push((slot, fut));
        }

        let (done, _) = watch::channel(pending_keys.is_empty());
        let data = DeferredData {
            inner: Arc::new(Inner {
                entries,
                token: CancellationToken::new(),
                pending: Mutex::new(pending_keys),
                listeners: Mutex::new(Vec::new()),
                done,
            }),
        };

        for (slot, fut) in tasks {
            let weak = Arc::downgrade(&data.inner);
            tokio::spawn(async move {
                let result = fut.await;
                match weak.upgrade() {
                    Some(inner) => inner.on_settle(&slot, result),
                    None => {
                        slot.settle(result);
                    }
                }
            });
        }
        data
    }
}

struct Inner {
    entries: BTreeMap<String, DeferredEntry>,
    token: CancellationToken,
    pending: Mutex<BTreeSet<String>>,
    listeners: Mutex<Vec<SettleListener>>,
    done: watch::Sender<bool>,
}

impl Inner {
    fn on_settle(&self, slot: &DeferredValue, result: Result<Value, RouteError>) {
        let mut pending = self.pending.lock();
        if self.token.is_cancelled() || !slot.settle(result) {
            return;
        }
        pending.remove(slot.key());
        let done = pending.is_empty();
        if done {
            self.done.send_replace(true);
        }
        self.emit(SettleEvent::Settled {
            key: slot.key(),
            done,
        });
    }

    fn emit(&self, event: SettleEvent<'_>) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(event);
        }
    }
}

/// A loader payload with lazily-resolving keys. Clones share state.
#[derive(Clone)]
pub struct DeferredData {
    inner: Arc<Inner>,
}

impl DeferredData {
    pub fn get(&self, key: &str) -> Option<&DeferredEntry> {
        self.inner.entries.get(key)
    }

    /// A value that was ready when the loader returned.
    pub fn critical(&self, key: &str) -> Option<&Value> {
        match self.inner.entries.get(key) {
            Some(DeferredEntry::Ready(value)) => Some(value),
            _ => None,
        }
    }

    /// The handle for a lazily-resolving key.
    pub fn deferred(&self, key: &str) -> Option<&DeferredValue> {
        match self.inner.entries.get(key) {
            Some(DeferredEntry::Pending(value)) => Some(value),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.entries.keys().map(String::as_str)
    }

    pub fn pending_keys(&self) -> Vec<String> {
        self.inner.pending.lock().iter().cloned().collect()
    }

    /// Every key settled (or the payload was cancelled).
    pub fn is_done(&self) -> bool {
        *self.inner.done.borrow()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Abort every pending key. Idempotent.
    pub fn cancel(&self) {
        let mut pending = self.inner.pending.lock();
        if self.inner.token.is_cancelled() {
            return;
        }
        self.inner.token.cancel();

        let mut aborted = 0u64;
        for key in pending.iter() {
            if let Some(DeferredEntry::Pending(value)) = self.inner.entries.get(key) {
                if value.abort() {
                    aborted += 1;
                }
            }
        }
        pending.clear();
        self.inner.done.send_replace(true);
        metrics::record_deferred_aborted(aborted);
        self.inner.emit(SettleEvent::Aborted);
    }

    /// Cancel this payload when `token` fires, unless it settles first.
    pub(crate) fn abort_on(&self, token: &CancellationToken) {
        if self.is_done() {
            return;
        }
        let token = token.clone();
        let data = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => data.cancel(),
                _ = data.settled() => {}
            }
        });
    }

    /// Wait until every key settled or the payload was cancelled.
    pub async fn settled(&self) {
        let mut rx = self.inner.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub fn subscribe(&self, listener: SettleListener) {
        self.inner.listeners.lock().push(listener);
    }

    /// Await every key and flatten into one JSON object.
    pub async fn resolve_data(&self) -> Result<Value, RouteError> {
        let mut out = Map::new();
        for (key, entry) in &self.inner.entries {
            let value = match entry {
                DeferredEntry::Ready(value) => value.clone(),
                DeferredEntry::Pending(pending) => pending.value().await?,
            };
            out.insert(key.clone(), value);
        }
        Ok(Value::Object(out))
    }

    /// The flattened payload, once every key resolved successfully.
    pub fn unwrapped(&self) -> Option<Value> {
        use crate::deferred::value::DeferredState;

        let mut out = Map::new();
        for (key, entry) in &self.inner.entries {
            let value = match entry {
                DeferredEntry::Ready(value) => value.clone(),
                DeferredEntry::Pending(pending) => match pending.state() {
                    DeferredState::Resolved(value) => value,
                    _ => return None,
                },
            };
            out.insert(key.clone(), value);
        }
        Some(Value::Object(out))
    }

    pub fn ptr_eq(&self, other: &DeferredData) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DeferredData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredData")
            .field("entries", &self.inner.entries)
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use serde_json::json;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_critical_and_pending() {
        let (tx, rx) = oneshot::channel::<Value>();
        let data = defer()
            .value("critical", json!("1"))
            .pending("lazy", async move { rx.await.map_err(|_| RouteError::Error("dropped".into())) })
            .build();

        assert_eq!(data.critical("critical"), Some(&json!("1")));
        assert!(data.deferred("lazy").unwrap().is_pending());
        assert!(!data.is_done());

        tx.send(json!("2")).unwrap();
        assert_eq!(data.deferred("lazy").unwrap().value().await, Ok(json!("2")));
        data.settled().await;
        assert_eq!(data.unwrapped(), Some(json!({"critical": "1", "lazy": "2"})));
    }

    #[tokio::test]
    async fn test_cancel_freezes_and_silences() {
        let (tx, rx) = oneshot::channel::<Value>();
        let data = defer()
            .pending("lazy", async move { rx.await.map_err(|_| RouteError::Error("dropped".into())) })
            .build();

        let settled = Arc::new(AtomicUsize::new(0));
        let aborted = Arc::new(AtomicUsize::new(0));
        {
            let settled = settled.clone();
            let aborted = aborted.clone();
            data.subscribe(Arc::new(move |event| match event {
                SettleEvent::Settled { .. } => {
                    settled.fetch_add(1, Ordering::SeqCst);
                }
                SettleEvent::Aborted => {
                    aborted.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        data.cancel();
        data.cancel();
        let _ = tx.send(json!("late"));
        tokio::task::yield_now().await;

        assert!(data.is_aborted());
        assert!(data.is_done());
        assert_eq!(data.deferred("lazy").unwrap().value().await, Err(RouteError::AbortedDeferred));
        assert_eq!(settled.load(Ordering::SeqCst), 0);
        assert_eq!(aborted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_on_token() {
        let token = CancellationToken::new();
        let data = defer()
            .pending("never", futures::future::pending::<Result<Value, RouteError>>())
            .build();
        data.abort_on(&token);
        token.cancel();
        data.settled().await;
        assert!(data.is_aborted());
    }

    #[tokio::test]
    async fn test_resolve_data_rejects() {
        let data = defer()
            .value("a", json!(1))
            .pending("b", async { Err::<Value, _>(RouteError::Error("bad".into())) })
            .build();
        assert_eq!(data.resolve_data().await, Err(RouteError::Error("bad".into())));
    }
}
