//! A single lazily-resolving value.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use crate::error::RouteError;

/// Where a deferred value is in its one-way lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredState {
    Pending,
    Resolved(Value),
    Rejected(RouteError),
    /// Terminal; later settlement of the underlying work is ignored.
    Aborted,
}

impl DeferredState {
    pub fn is_pending(&self) -> bool {
        matches!(self, DeferredState::Pending)
    }
}

struct Slot {
    key: String,
    state: watch::Sender<DeferredState>,
}

/// Consumer-facing handle to one deferred key. Clones share the same slot.
#[derive(Clone)]
pub struct DeferredValue {
    slot: Arc<Slot>,
}

impl DeferredValue {
    pub(crate) fn pending(key: impl Into<String>) -> Self {
        let (state, _) = watch::channel(DeferredState::Pending);
        Self {
            slot: Arc::new(Slot {
                key: key.into(),
                state,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.slot.key
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> DeferredState {
        self.slot.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.state.borrow().is_pending()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(*self.slot.state.borrow(), DeferredState::Aborted)
    }

    /// Wait for the value.
    ///
    /// Rejects with the loader's error, or with `RouteError::AbortedDeferred`
    /// once the owning context was cancelled.
    pub async fn value(&self) -> Result<Value, RouteError> {
        let mut rx = self.slot.state.subscribe();
        let settled = rx
            .wait_for(|s| !s.is_pending())
            .await
            .map(|state| state.clone());
        match settled {
            Ok(DeferredState::Resolved(value)) => Ok(value),
            Ok(DeferredState::Rejected(error)) => Err(error),
            Ok(DeferredState::Aborted) | Ok(DeferredState::Pending) | Err(_) => {
                Err(RouteError::AbortedDeferred)
            }
        }
    }

    /// Same underlying slot.
    pub fn ptr_eq(&self, other: &DeferredValue) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Move out of `Pending`. Returns false if already settled or aborted.
    pub(crate) fn settle(&self, result: Result<Value, RouteError>) -> bool {
        self.slot.state.send_if_modified(move |state| {
            if !state.is_pending() {
                return false;
            }
            *state = match result {
                Ok(value) => DeferredState::Resolved(value),
                Err(error) => DeferredState::Rejected(error),
            };
            true
        })
    }

    pub(crate) fn abort(&self) -> bool {
        self.slot.state.send_if_modified(|state| {
            if !state.is_pending() {
                return false;
            }
            *state = DeferredState::Aborted;
            true
        })
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredValue")
            .field("key", &self.slot.key)
            .field("state", &*self.slot.state.borrow())
            .finish()
    }
}
