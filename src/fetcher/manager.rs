//! Keyed fetchers: loads and submissions that run outside navigation.
//!
//! # Data Flow
//! ```text
//! fetch(key, href) ──► match ──► loader ──► Fetcher{Idle, data}
//!                        │
//!                        └─► action ──► Fetcher{Loading, action data}
//!                                         └─► revalidate() ──► commit ──► Idle
//! ```
//!
//! A new `fetch` on a key cancels the one in flight. Every result is checked
//! against the context id that started it, so a late result never lands.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ErrorResponse, FatalCause, FatalError, RouteError, RouterError};
use crate::fetcher::state::{Fetcher, FetcherState};
use crate::loader::result::call_handler;
use crate::loader::{DataResult, HandlerKind, RedirectResult};
use crate::navigation::controller::{find_boundary, target_match, Controller, NavigationOutcome};
use crate::navigation::location::Location;
use crate::observability::metrics;
use crate::request::{AbortableContext, FormData, Submission};
use crate::revalidation::{fetcher_should_revalidate, LoadPlan};
use crate::routing::path::RelativeRouting;
use crate::routing::RouteMatch;

/// Options for `Router::fetch`.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub submission: Option<Submission>,
    /// Route the fetch is issued from; relative hrefs and errors resolve against it.
    pub from_route_id: Option<String>,
}

impl FetchOptions {
    pub fn submit(submission: Submission) -> Self {
        Self {
            submission: Some(submission),
            from_route_id: None,
        }
    }

    pub fn from_route(mut self, route_id: impl Into<String>) -> Self {
        self.from_route_id = Some(route_id.into());
        self
    }
}

/// The GET a fetcher last completed, replayed on revalidation.
#[derive(Debug, Clone)]
pub(crate) struct FetchLoad {
    pub(crate) href: String,
    pub(crate) route_id: String,
}

pub(crate) struct FetcherRevalidation {
    pub(crate) key: String,
    pub(crate) ctx: AbortableContext,
    pub(crate) target: RouteMatch,
    pub(crate) load: FetchLoad,
}

struct FetcherEntry {
    fetcher: Fetcher,
    ctx: Option<AbortableContext>,
    load: Option<FetchLoad>,
    revalidating: bool,
}

/// Fetcher records by key.
///
/// Guards never outlive a method call, and no method takes the controller's
/// control lock, so the table is safe to touch while that lock is held.
#[derive(Default)]
pub(crate) struct FetcherTable {
    entries: DashMap<String, FetcherEntry>,
}

impl FetcherTable {
    pub(crate) fn get(&self, key: &str) -> Option<Fetcher> {
        self.entries.get(key).map(|e| e.fetcher.clone())
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, Fetcher> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.fetcher.clone()))
            .collect()
    }

    fn data(&self, key: &str) -> Option<Value> {
        self.entries.get(key).and_then(|e| e.fetcher.data.clone())
    }

    /// Start a call on `key`, cancelling whatever was in flight.
    fn begin(&self, key: &str, fetcher: Fetcher, ctx: AbortableContext) {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| FetcherEntry {
            fetcher: Fetcher::default(),
            ctx: None,
            load: None,
            revalidating: false,
        });
        if let Some(previous) = entry.ctx.replace(ctx) {
            tracing::debug!(key = %key, "Fetcher superseded");
            previous.cancel();
        }
        entry.fetcher = fetcher;
        entry.revalidating = false;
    }

    fn is_current(&self, key: &str, ctx_id: Uuid) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.ctx.as_ref().is_some_and(|c| c.id() == ctx_id))
    }

    /// Settle the call owned by `ctx_id`.
    pub(crate) fn finish(&self, key: &str, ctx_id: Uuid, fetcher: Fetcher, load: Option<FetchLoad>) -> bool {
        match self.entries.get_mut(key) {
            Some(mut e) if e.ctx.as_ref().is_some_and(|c| c.id() == ctx_id) => {
                e.fetcher = fetcher;
                e.ctx = None;
                e.load = load;
                e.revalidating = false;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn remove_if_current(&self, key: &str, ctx_id: Uuid) -> bool {
        self.entries
            .remove_if(key, |_, e| e.ctx.as_ref().is_some_and(|c| c.id() == ctx_id))
            .is_some()
    }

    fn remove(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                if let Some(ctx) = entry.ctx {
                    ctx.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Back to idle, keeping data. Used once a redirect or revalidation the
    /// fetcher was waiting on has committed.
    /// An entry that a newer call owns is left alone.
    pub(crate) fn settle(&self, key: &str) {
        if let Some(mut e) = self.entries.get_mut(key) {
            if e.ctx.is_some() && !e.revalidating {
                return;
            }
            let data = e.fetcher.data.take();
            e.fetcher = Fetcher::done(data);
            e.ctx = None;
            e.revalidating = false;
        }
    }

    /// Idle the fetchers whose revalidation was cancelled with its navigation.
    pub(crate) fn reset_stale_revalidations(&self) {
        for mut e in self.entries.iter_mut() {
            if e.revalidating {
                e.fetcher.state = FetcherState::Idle;
                e.ctx = None;
                e.revalidating = false;
            }
        }
    }

    /// Idle fetchers with a completed GET to replay, minus `skip`.
    fn revalidation_candidates(&self, skip: &HashSet<String>) -> Vec<(String, FetchLoad)> {
        self.entries
            .iter()
            .filter(|e| !skip.contains(e.key()))
            .filter(|e| e.fetcher.state == FetcherState::Idle || e.revalidating)
            .filter_map(|e| e.load.clone().map(|load| (e.key().clone(), load)))
            .collect()
    }

    fn begin_revalidation(&self, key: &str, ctx: AbortableContext) {
        if let Some(mut e) = self.entries.get_mut(key) {
            if let Some(previous) = e.ctx.replace(ctx) {
                previous.cancel();
            }
            e.fetcher.state = FetcherState::Loading;
            e.revalidating = true;
        }
    }

    pub(crate) fn cancel_all(&self) {
        for e in self.entries.iter() {
            if let Some(ctx) = &e.ctx {
                ctx.cancel();
            }
        }
        self.entries.clear();
    }
}

impl Controller {
    pub(crate) async fn fetch(
        self: &Arc<Self>,
        key: &str,
        href: &str,
        opts: FetchOptions,
    ) -> Result<(), RouterError> {
        if self.is_disposed() {
            return Err(RouterError::Disposed);
        }
        let current = self.state();
        let mut path = self.resolve_href(href, opts.from_route_id.as_deref(), RelativeRouting::Route, &current);
        path.hash.clear();

        let submission = match opts.submission {
            Some(submission) if submission.is_mutation() => Some(submission),
            Some(submission) => {
                let query = submission.form_data().map(FormData::to_query).unwrap_or_default();
                path.search = if query.is_empty() { String::new() } else { format!("?{query}") };
                None
            }
            None => None,
        };
        let href = format!("{}{}", path.pathname, path.search);

        let Some(matches) = self.tree.match_routes(&path.pathname, &self.basename) else {
            tracing::info!(key = %key, href = %href, "Fetch matched no route");
            metrics::record_fetch("not_found");
            self.fetcher_error(key, opts.from_route_id.as_deref(), ErrorResponse::not_found(&path.pathname).into());
            return Ok(());
        };
        let Some(target) = target_match(&matches, &path.search).cloned() else {
            return Ok(());
        };
        let source_len = matches.iter().position(|m| m.route.id == target.route.id).map_or(matches.len(), |i| i + 1);
        let source = &matches[..source_len];

        match submission {
            Some(submission) => {
                let submission = Submission {
                    form_action: href.clone(),
                    ..submission
                };
                self.fetch_action(key, &href, &target, source, submission, opts.from_route_id.as_deref())
                    .await
            }
            None => self.fetch_loader(key, &href, &target, source, opts.from_route_id.as_deref()).await,
        }
    }

    /// A new call owns the key; it no longer waits on an earlier commit.
    fn begin_fetcher(&self, key: &str, fetcher: Fetcher, ctx: AbortableContext) {
        let mut control = self.control.lock();
        control.fetch_redirect_keys.remove(key);
        control.fetch_reload_keys.remove(key);
        self.fetchers.begin(key, fetcher, ctx);
    }

    async fn fetch_loader(
        self: &Arc<Self>,
        key: &str,
        href: &str,
        target: &RouteMatch,
        source: &[RouteMatch],
        from_route_id: Option<&str>,
    ) -> Result<(), RouterError> {
        metrics::record_fetch("load");
        let ctx = AbortableContext::child_of(&self.shutdown, key);
        self.begin_fetcher(key, Fetcher::loading(self.fetchers.data(key), None), ctx.clone());
        self.notify();
        tracing::debug!(key = %key, href = %href, route_id = %target.route.id, "Fetcher loading");

        let Some(result) = self.call_fetch_loader(target, href, &ctx).await else {
            return Ok(());
        };
        if !self.fetchers.is_current(key, ctx.id()) {
            result.discard();
            return Ok(());
        }

        match result {
            DataResult::Redirect(redirect) => self.fetch_redirect(key, ctx.id(), redirect, source, href, None).await,
            DataResult::Error(error) => {
                if self.fetchers.remove_if_current(key, ctx.id()) {
                    self.fetcher_error(key, from_route_id, error);
                }
                Ok(())
            }
            DataResult::Data(value) => {
                let load = FetchLoad {
                    href: href.to_string(),
                    route_id: target.route.id.clone(),
                };
                if self.fetchers.finish(key, ctx.id(), Fetcher::done(Some(value)), Some(load)) {
                    self.notify();
                }
                Ok(())
            }
            DataResult::Deferred(data) => {
                data.cancel();
                Ok(())
            }
        }
    }

    async fn fetch_action(
        self: &Arc<Self>,
        key: &str,
        href: &str,
        target: &RouteMatch,
        source: &[RouteMatch],
        submission: Submission,
        from_route_id: Option<&str>,
    ) -> Result<(), RouterError> {
        metrics::record_fetch("submit");
        let route_id = target.route.id.clone();
        let Some(action) = target.route.action.clone() else {
            tracing::warn!(key = %key, route_id = %route_id, method = %submission.form_method, "Fetcher submitted to a route without an action");
            self.fetchers.remove(key);
            let error = ErrorResponse::method_not_allowed(&submission.form_method, href, &route_id);
            self.fetcher_error(key, from_route_id, error.into());
            return Ok(());
        };

        self.control.lock().revalidation_required = true;
        let ctx = AbortableContext::child_of(&self.shutdown, key);
        self.begin_fetcher(
            key,
            Fetcher::submitting(self.fetchers.data(key), submission.clone()),
            ctx.clone(),
        );
        self.notify();
        tracing::debug!(key = %key, href = %href, route_id = %route_id, "Fetcher submitting");

        let args = match self.handler_args(href, &ctx, Some(submission.clone()), target) {
            Ok(args) => args,
            Err(e) => {
                self.fetchers.remove(key);
                self.fetcher_error(key, from_route_id, RouteError::Error(e.to_string()));
                return Ok(());
            }
        };
        let Some(result) = call_handler(HandlerKind::Action, &route_id, &action, args, &ctx).await else {
            return Ok(());
        };
        let result = result.resolve_deferred().await;
        if !self.fetchers.is_current(key, ctx.id()) {
            return Ok(());
        }

        match result {
            DataResult::Redirect(redirect) => {
                self.fetch_redirect(key, ctx.id(), redirect, source, href, Some(submission))
                    .await
            }
            DataResult::Error(error) => {
                if self.fetchers.remove_if_current(key, ctx.id()) {
                    self.fetcher_error(key, from_route_id, error);
                }
                Ok(())
            }
            DataResult::Data(value) => self.reload_after_submit(key, ctx.id(), value, submission).await,
            DataResult::Deferred(data) => {
                let value = data.unwrapped().unwrap_or(Value::Null);
                self.reload_after_submit(key, ctx.id(), value, submission).await
            }
        }
    }

    /// Hold the action data in a loading fetcher until the revalidation it
    /// triggers commits.
    async fn reload_after_submit(
        self: &Arc<Self>,
        key: &str,
        ctx_id: Uuid,
        value: Value,
        submission: Submission,
    ) -> Result<(), RouterError> {
        {
            let mut control = self.control.lock();
            if !self.fetchers.finish(key, ctx_id, Fetcher::loading(Some(value), Some(submission)), None) {
                return Ok(());
            }
            control.fetch_reload_keys.insert(key.to_string());
        }
        self.notify();
        tracing::debug!(key = %key, "Fetcher submission done; revalidating");
        self.revalidate().await.map(|_| ())
    }

    async fn fetch_redirect(
        self: &Arc<Self>,
        key: &str,
        ctx_id: Uuid,
        redirect: RedirectResult,
        source: &[RouteMatch],
        href: &str,
        submission: Option<Submission>,
    ) -> Result<(), RouterError> {
        {
            let mut control = self.control.lock();
            let data = self.fetchers.data(key);
            if !self.fetchers.finish(key, ctx_id, Fetcher::loading(data, None), None) {
                return Ok(());
            }
            control.fetch_redirect_keys.insert(key.to_string());
        }
        self.notify();
        metrics::record_redirect(redirect.status);

        let from = Location::new(href);
        let outcome = self
            .start_redirect(redirect, source, &from, submission, false, 1, None)
            .await?;
        tracing::debug!(key = %key, outcome = outcome.as_str(), "Fetcher redirect settled");
        if outcome != NavigationOutcome::Committed {
            let removed = self.control.lock().fetch_redirect_keys.remove(key);
            if removed {
                self.fetchers.settle(key);
                self.notify();
            }
        }
        Ok(())
    }

    /// Run the loader of `target` for a fetcher, resolving deferred data.
    pub(crate) async fn call_fetch_loader(
        &self,
        target: &RouteMatch,
        href: &str,
        ctx: &AbortableContext,
    ) -> Option<DataResult> {
        let Some(loader) = &target.route.loader else {
            return Some(DataResult::Data(Value::Null));
        };
        let args = match self.handler_args(href, ctx, None, target) {
            Ok(args) => args,
            Err(e) => return Some(DataResult::Error(RouteError::Error(e.to_string()))),
        };
        let result = call_handler(HandlerKind::Loader, &target.route.id, loader, args, ctx).await?;
        Some(result.resolve_deferred().await)
    }

    /// Idle fetchers that reload during this load phase, each with a context
    /// tied to the navigation `token`.
    pub(crate) fn fetchers_to_revalidate(
        &self,
        plan: &LoadPlan<'_>,
        token: &CancellationToken,
        skip: &HashSet<String>,
    ) -> Vec<FetcherRevalidation> {
        let mut out = Vec::new();
        for (key, load) in self.fetchers.revalidation_candidates(skip) {
            let path = Location::new(&load.href);
            let Some(matches) = self.tree.match_routes(&path.pathname, &self.basename) else {
                continue;
            };
            let Some(target) = matches.iter().find(|m| m.route.id == load.route_id).cloned() else {
                continue;
            };
            if !fetcher_should_revalidate(&target.route, plan, &target) {
                continue;
            }
            let ctx = AbortableContext::child_of(token, &key);
            self.fetchers.begin_revalidation(&key, ctx.clone());
            out.push(FetcherRevalidation { key, ctx, target, load });
        }
        if !out.is_empty() {
            self.notify();
        }
        out
    }

    /// Surface a fetcher error at the boundary nearest the route that issued it.
    fn fetcher_error(&self, key: &str, from_route_id: Option<&str>, error: RouteError) {
        self.fetchers.remove(key);
        let _control = self.control.lock();
        let current = self.state();
        let route_id = from_route_id
            .map(str::to_string)
            .or_else(|| current.leaf().map(|m| m.route.id.clone()));
        let boundary = route_id.as_deref().and_then(|id| find_boundary(&current.matches, id));
        match boundary {
            Some(boundary) => {
                tracing::warn!(key = %key, boundary = %boundary, error = %error, "Fetcher error captured by boundary");
                self.state.send_modify(|state| {
                    let state = Arc::make_mut(state);
                    state.errors.clear();
                    state.errors.insert(boundary, error);
                });
            }
            None => {
                let fatal = FatalError {
                    location: current.location.clone(),
                    route_id,
                    error: FatalCause::Route(error),
                };
                tracing::error!(key = %key, error = %fatal, "Fetcher error with no boundary");
                self.state.send_modify(|state| Arc::make_mut(state).fatal_error = Some(fatal));
            }
        }
    }

    pub(crate) fn fetcher(&self, key: &str) -> Option<Fetcher> {
        self.fetchers.get(key)
    }

    pub(crate) fn all_fetchers(&self) -> BTreeMap<String, Fetcher> {
        self.fetchers.snapshot()
    }

    pub(crate) fn delete_fetcher(&self, key: &str) {
        {
            let mut control = self.control.lock();
            control.fetch_redirect_keys.remove(key);
            control.fetch_reload_keys.remove(key);
        }
        if self.fetchers.remove(key) {
            tracing::debug!(key = %key, "Fetcher deleted");
            self.notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stale_context_cannot_finish() {
        let table = FetcherTable::default();
        let first = AbortableContext::new("k");
        table.begin("k", Fetcher::loading(None, None), first.clone());
        let second = AbortableContext::new("k");
        table.begin("k", Fetcher::loading(None, None), second.clone());

        assert!(first.is_cancelled());
        assert!(!table.finish("k", first.id(), Fetcher::done(Some(json!(1))), None));
        assert!(table.finish("k", second.id(), Fetcher::done(Some(json!(2))), None));
        assert_eq!(table.get("k").unwrap().data, Some(json!(2)));
        assert!(table.get("k").unwrap().is_idle());
    }

    #[test]
    fn test_settle_skips_a_newer_call() {
        let table = FetcherTable::default();
        let submit = AbortableContext::new("k");
        table.begin("k", Fetcher::loading(None, None), submit.clone());
        table.finish("k", submit.id(), Fetcher::loading(Some(json!("acted")), None), None);
        let load = AbortableContext::new("k");
        table.begin("k", Fetcher::loading(Some(json!("acted")), None), load.clone());

        table.settle("k");
        assert_eq!(table.get("k").unwrap().state, FetcherState::Loading);
        assert!(table.finish("k", load.id(), Fetcher::done(Some(json!("latest"))), None));
        assert_eq!(table.get("k").unwrap().data, Some(json!("latest")));
    }

    #[test]
    fn test_revalidation_candidates_need_a_completed_load() {
        let table = FetcherTable::default();
        let a = AbortableContext::new("a");
        table.begin("a", Fetcher::loading(None, None), a.clone());
        table.finish(
            "a",
            a.id(),
            Fetcher::done(Some(json!(1))),
            Some(FetchLoad {
                href: "/a".into(),
                route_id: "a".into(),
            }),
        );
        let b = AbortableContext::new("b");
        table.begin("b", Fetcher::loading(None, None), b);

        let candidates = table.revalidation_candidates(&HashSet::new());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0, "a");

        let skip = HashSet::from(["a".to_string()]);
        assert!(table.revalidation_candidates(&skip).is_empty());
    }

    #[test]
    fn test_stale_revalidation_resets_to_idle() {
        let table = FetcherTable::default();
        let ctx = AbortableContext::new("a");
        table.begin("a", Fetcher::done(Some(json!("kept"))), ctx.clone());
        table.begin_revalidation("a", AbortableContext::new("a"));
        assert_eq!(table.get("a").unwrap().state, FetcherState::Loading);

        table.reset_stale_revalidations();
        let fetcher = table.get("a").unwrap();
        assert!(fetcher.is_idle());
        assert_eq!(fetcher.data, Some(json!("kept")));
    }
}
