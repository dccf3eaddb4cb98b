//! Bookkeeping for deferred payloads that are live in router state.

use std::collections::HashMap;

use crate::deferred::data::DeferredData;

/// Deferred payloads keyed by the route id whose loader produced them.
#[derive(Debug, Default)]
pub struct ActiveDeferreds {
    by_route: HashMap<String, DeferredData>,
}

impl ActiveDeferreds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `data` for `route_id`, cancelling any different payload
    /// it replaces. Returns false for an already-settled payload.
    pub fn track(&mut self, route_id: &str, data: &DeferredData) -> bool {
        if let Some(previous) = self.by_route.get(route_id) {
            if previous.ptr_eq(data) {
                return !data.is_done();
            }
            previous.cancel();
        }
        if data.is_done() {
            self.by_route.remove(route_id);
            return false;
        }
        self.by_route.insert(route_id.to_string(), data.clone());
        true
    }

    pub fn get(&self, route_id: &str) -> Option<&DeferredData> {
        self.by_route.get(route_id)
    }

    pub fn contains(&self, route_id: &str) -> bool {
        self.by_route.contains_key(route_id)
    }

    /// Cancel and forget every payload whose route matches `pred`.
    /// Returns the affected route ids.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&str) -> bool) -> Vec<String> {
        let ids: Vec<String> = self
            .by_route
            .keys()
            .filter(|id| pred(id))
            .cloned()
            .collect();
        for id in &ids {
            if let Some(data) = self.by_route.remove(id) {
                tracing::debug!(route_id = %id, "Cancelling active deferred");
                data.cancel();
            }
        }
        ids
    }

    pub fn cancel_all(&mut self) -> Vec<String> {
        self.cancel_where(|_| true)
    }

    /// Drop payloads that finished on their own.
    pub fn prune_done(&mut self) {
        self.by_route.retain(|_, data| !data.is_done());
    }

    pub fn len(&self) -> usize {
        self.by_route.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_route.is_empty()
    }
}
