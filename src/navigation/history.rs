//! History abstraction and an in-memory implementation.
//!
//! The router treats history as an event source (POP updates from `go`) and
//! a mutation sink (`push`/`replace` at commit). It never owns the stack.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::navigation::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    Pop,
    Push,
    Replace,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Pop => "POP",
            HistoryAction::Push => "PUSH",
            HistoryAction::Replace => "REPLACE",
        }
    }
}

/// A change reported to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryUpdate {
    pub action: HistoryAction,
    pub location: Location,
    pub delta: isize,
}

pub type HistoryListener = Arc<dyn Fn(HistoryUpdate) + Send + Sync>;

/// The location stack the router drives.
pub trait History: Send + Sync {
    fn location(&self) -> Location;

    /// Register for POP updates. Returns an id for `unlisten`.
    fn listen(&self, listener: HistoryListener) -> usize;

    fn unlisten(&self, id: usize);

    fn push(&self, location: Location);

    fn replace(&self, location: Location);

    /// Move within the stack; listeners see a POP when the index changes.
    fn go(&self, delta: isize);
}

struct MemoryInner {
    entries: Vec<Location>,
    index: usize,
    listeners: Vec<(usize, HistoryListener)>,
    next_listener: usize,
}

/// A history stack held in memory (tests, non-browser hosts).
pub struct MemoryHistory {
    inner: Mutex<MemoryInner>,
}

impl MemoryHistory {
    /// A stack of `entries`, positioned at the last one. Empty means `["/"]`.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut locations: Vec<Location> = entries.iter().map(|e| Location::new(e.as_ref())).collect();
        if locations.is_empty() {
            locations.push(Location::root());
        }
        let index = locations.len() - 1;
        Self {
            inner: Mutex::new(MemoryInner {
                entries: locations,
                index,
                listeners: Vec::new(),
                next_listener: 0,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.inner.lock().index
    }

    pub fn entries(&self) -> Vec<Location> {
        self.inner.lock().entries.clone()
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new::<&str>(&[])
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        let inner = self.inner.lock();
        inner.entries[inner.index].clone()
    }

    fn listen(&self, listener: HistoryListener) -> usize {
        let mut inner = self.inner.lock();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.listeners.push((id, listener));
        id
    }

    fn unlisten(&self, id: usize) {
        self.inner.lock().listeners.retain(|(l, _)| *l != id);
    }

    fn push(&self, location: Location) {
        let mut inner = self.inner.lock();
        let next = inner.index + 1;
        inner.entries.truncate(next);
        inner.entries.push(location);
        inner.index = next;
    }

    fn replace(&self, location: Location) {
        let mut inner = self.inner.lock();
        let index = inner.index;
        inner.entries[index] = location;
    }

    fn go(&self, delta: isize) {
        let (update, listeners) = {
            let mut inner = self.inner.lock();
            let max = inner.entries.len() as isize - 1;
            let next = (inner.index as isize + delta).clamp(0, max) as usize;
            if next == inner.index {
                return;
            }
            let moved = next as isize - inner.index as isize;
            inner.index = next;
            let update = HistoryUpdate {
                action: HistoryAction::Pop,
                location: inner.entries[next].clone(),
                delta: moved,
            };
            let listeners: Vec<HistoryListener> = inner.listeners.iter().map(|(_, l)| l.clone()).collect();
            (update, listeners)
        };
        for listener in listeners {
            listener(update.clone());
        }
    }
}
