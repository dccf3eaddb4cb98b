//! Navigation controller: the state machine behind `Router`.
//!
//! # Responsibilities
//! - Serialize every state transition behind one control lock
//! - Run action then loaders for the latest navigation only
//! - Follow redirects, place errors at boundaries, commit atomically
//!
//! # Design Decisions
//! - One `CancellationToken` per navigation; each route call gets a child
//!   context, so superseding a navigation cancels all of its work at once
//! - The control lock is never held across an `.await`
//! - State is published through a `watch` channel; commits swap in a new
//!   snapshot in one `send_modify`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{join, join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::deferred::{ActiveDeferreds, DeferredData, SettleEvent};
use crate::error::{ErrorResponse, FatalCause, FatalError, RouteError, RouterError};
use crate::fetcher::manager::{FetchLoad, FetcherRevalidation, FetcherTable};
use crate::fetcher::Fetcher;
use crate::loader::result::call_handler;
use crate::loader::{DataResult, HandlerArgs, HandlerKind, RedirectResult};
use crate::navigation::history::{History, HistoryAction};
use crate::navigation::hooks::{run_transition_hooks, HookDecision};
use crate::navigation::location::{Location, Path};
use crate::navigation::redirect::{
    redirect_history_action, resolve_redirect, DocumentNavigator, RedirectContext, RedirectTarget,
};
use crate::navigation::state::{NavigationState, RevalidationState, RouteData, RouterState};
use crate::observability::metrics;
use crate::request::{AbortableContext, FormData, Request, Submission};
use crate::revalidation::{matches_to_load, LoadPlan};
use crate::routing::path::{prepend_basename, resolve_to, strip_basename, RelativeRouting};
use crate::routing::{RouteMatch, RouteTree};

/// How a navigation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    Committed,
    /// Committed with no matches.
    NotFound,
    /// A newer navigation took over before this one settled.
    Superseded,
    /// Folded into a navigation already in flight.
    Joined,
    /// Left the application through the document navigator.
    Redirected { href: String },
    /// A transition hook cancelled it.
    Blocked,
    /// No boundary absorbed an error; see `RouterState::fatal_error`.
    Failed(FatalError),
}

impl NavigationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationOutcome::Committed => "committed",
            NavigationOutcome::NotFound => "not_found",
            NavigationOutcome::Superseded => "superseded",
            NavigationOutcome::Joined => "joined",
            NavigationOutcome::Redirected { .. } => "redirected",
            NavigationOutcome::Blocked => "blocked",
            NavigationOutcome::Failed(_) => "failed",
        }
    }
}

/// Options for `Router::navigate`.
#[derive(Debug, Clone, Default)]
pub struct NavigateOptions {
    /// `Some(true)` replaces, `Some(false)` pushes, `None` decides automatically.
    pub replace: Option<bool>,
    pub state: Option<Value>,
    pub submission: Option<Submission>,
    /// Resolve relative targets against this route instead of the leaf.
    pub from_route_id: Option<String>,
    pub relative: RelativeRouting,
}

impl NavigateOptions {
    pub fn replace() -> Self {
        Self {
            replace: Some(true),
            ..Self::default()
        }
    }

    pub fn submit(submission: Submission) -> Self {
        Self {
            submission: Some(submission),
            ..Self::default()
        }
    }

    pub fn from_route(mut self, route_id: impl Into<String>) -> Self {
        self.from_route_id = Some(route_id.into());
        self
    }

    pub fn relative(mut self, relative: RelativeRouting) -> Self {
        self.relative = relative;
        self
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StartOptions {
    pub(crate) submission: Option<Submission>,
    pub(crate) force_revalidate: bool,
    /// Revalidation of the current location: no history change, action data kept.
    pub(crate) uninterrupted: bool,
    pub(crate) redirect_depth: u32,
}

pub(crate) struct PendingNavigation {
    id: u64,
    token: CancellationToken,
    history_action: HistoryAction,
    location: Location,
    uninterrupted: bool,
    /// Carries a mutation; restarting it would drop the action result.
    mutation: bool,
}

#[derive(Default)]
pub(crate) struct Control {
    pending: Option<PendingNavigation>,
    next_id: u64,
    pub(crate) revalidation_required: bool,
    cancelled_deferred_routes: HashSet<String>,
    active_deferreds: ActiveDeferreds,
    /// Fetchers whose redirect drives a navigation; idle once one commits.
    pub(crate) fetch_redirect_keys: HashSet<String>,
    /// Fetchers whose submission succeeded; idle once the revalidation commits.
    pub(crate) fetch_reload_keys: HashSet<String>,
    disposed: bool,
    history_listener: Option<usize>,
}

/// One in-flight navigation.
struct Nav {
    id: u64,
    token: CancellationToken,
    history_action: HistoryAction,
    location: Location,
    matches: Vec<RouteMatch>,
    submission: Option<Submission>,
    opts: StartOptions,
    started: Instant,
}

#[derive(Default)]
struct ActionPhase {
    route_id: Option<String>,
    data: Option<HashMap<String, Value>>,
    result: Option<Result<Value, RouteError>>,
    /// Boundary id and the error it absorbs.
    error: Option<(String, RouteError)>,
}

enum Step<T> {
    Continue(T),
    Done(NavigationOutcome),
}

pub(crate) struct FetcherResult {
    key: String,
    ctx_id: Uuid,
    load: FetchLoad,
    result: Result<Value, RouteError>,
}

struct Commit {
    matches: Vec<RouteMatch>,
    loader_data: HashMap<String, RouteData>,
    /// `None` keeps the current action data.
    action_data: Option<Option<HashMap<String, Value>>>,
    errors: HashMap<String, RouteError>,
    fetcher_results: Vec<FetcherResult>,
}

impl Commit {
    fn new(matches: Vec<RouteMatch>) -> Self {
        Self {
            matches,
            loader_data: HashMap::new(),
            action_data: Some(None),
            errors: HashMap::new(),
            fetcher_results: Vec::new(),
        }
    }
}

/// The router's shared core.
pub(crate) struct Controller {
    pub(crate) tree: RouteTree,
    pub(crate) basename: String,
    pub(crate) origin: Url,
    pub(crate) max_redirects: u32,
    pub(crate) history: Arc<dyn History>,
    pub(crate) document: Option<Arc<dyn DocumentNavigator>>,
    pub(crate) state: watch::Sender<Arc<RouterState>>,
    pub(crate) control: Mutex<Control>,
    pub(crate) fetchers: FetcherTable,
    pub(crate) shutdown: CancellationToken,
}

impl Controller {
    pub(crate) fn new(
        tree: RouteTree,
        basename: String,
        origin: Url,
        max_redirects: u32,
        history: Arc<dyn History>,
        document: Option<Arc<dyn DocumentNavigator>>,
    ) -> Arc<Self> {
        let location = history.location();
        let matches = tree.match_routes(&location.pathname, &basename).unwrap_or_default();
        let (state, _) = watch::channel(Arc::new(RouterState::new(location, matches)));
        Arc::new(Self {
            tree,
            basename,
            origin,
            max_redirects,
            history,
            document,
            state,
            control: Mutex::new(Control::default()),
            fetchers: FetcherTable::default(),
            shutdown: CancellationToken::new(),
        })
    }

    pub(crate) fn state(&self) -> Arc<RouterState> {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<RouterState>> {
        self.state.subscribe()
    }

    /// Wake subscribers without changing the snapshot.
    pub(crate) fn notify(&self) {
        self.state.send_modify(|_| {});
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.control.lock().disposed
    }

    fn is_current(&self, id: u64) -> bool {
        self.control.lock().pending.as_ref().is_some_and(|p| p.id == id)
    }

    fn publish_if_current(&self, id: u64, f: impl FnOnce(&mut RouterState)) {
        let control = self.control.lock();
        if control.pending.as_ref().is_some_and(|p| p.id == id) {
            self.state.send_modify(|state| f(Arc::make_mut(state)));
        }
    }

    pub(crate) fn url_for(&self, href: &str) -> Url {
        self.origin.join(href).unwrap_or_else(|_| self.origin.clone())
    }

    pub(crate) fn handler_args(
        &self,
        href: &str,
        ctx: &AbortableContext,
        submission: Option<Submission>,
        m: &RouteMatch,
    ) -> Result<HandlerArgs, RouterError> {
        Ok(HandlerArgs {
            request: Request::new(&self.origin, href, ctx.signal(), submission)?,
            params: m.params.clone(),
        })
    }

    /// Resolve an app-relative target the way links from `from_route_id` would.
    pub(crate) fn resolve_href(
        &self,
        to: &str,
        from_route_id: Option<&str>,
        relative: RelativeRouting,
        state: &RouterState,
    ) -> Path {
        let matches = match from_route_id.and_then(|id| state.matches.iter().position(|m| m.route.id == id)) {
            Some(idx) => &state.matches[..=idx],
            None => &state.matches[..],
        };
        let route_pathnames = contributing_pathnames(matches);
        let location_pathname =
            strip_basename(&state.location.pathname, &self.basename).unwrap_or_else(|| "/".to_string());
        let mut path = resolve_to(to, &route_pathnames, &location_pathname, relative);
        path.pathname = prepend_basename(&path.pathname, &self.basename);
        path
    }

    // ---- lifecycle ----

    pub(crate) async fn initialize(self: &Arc<Self>) -> Result<NavigationOutcome, RouterError> {
        {
            let mut control = self.control.lock();
            if control.disposed {
                return Err(RouterError::Disposed);
            }
            if control.history_listener.is_none() {
                let (tx, rx) = mpsc::unbounded_channel();
                let id = self.history.listen(Arc::new(move |update| {
                    let _ = tx.send(update);
                }));
                control.history_listener = Some(id);
                self.spawn_history_pump(rx);
            }
        }
        let location = self.history.location();
        tracing::debug!(location = %location, "Initial load");
        self.start_navigation(HistoryAction::Pop, location, StartOptions::default())
            .await
    }

    fn spawn_history_pump(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<crate::navigation::history::HistoryUpdate>) {
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    update = rx.recv() => {
                        let Some(update) = update else { break };
                        let Some(controller) = weak.upgrade() else { break };
                        tracing::debug!(location = %update.location, delta = update.delta, "History pop");
                        tokio::spawn(async move {
                            if let Err(e) = controller
                                .start_navigation(HistoryAction::Pop, update.location, StartOptions::default())
                                .await
                            {
                                tracing::warn!(error = %e, "Pop navigation failed");
                            }
                        });
                    }
                }
            }
            tracing::debug!("History listener stopped");
        });
    }

    pub(crate) fn dispose(&self) {
        let listener = {
            let mut control = self.control.lock();
            if control.disposed {
                return;
            }
            control.disposed = true;
            if let Some(pending) = control.pending.take() {
                pending.token.cancel();
            }
            control.active_deferreds.cancel_all();
            control.fetch_redirect_keys.clear();
            control.fetch_reload_keys.clear();
            control.history_listener.take()
        };
        if let Some(id) = listener {
            self.history.unlisten(id);
        }
        self.fetchers.cancel_all();
        self.shutdown.cancel();
        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            state.navigation = NavigationState::Idle;
            state.revalidation = RevalidationState::Idle;
        });
        tracing::info!("Router disposed");
    }

    // ---- entry points ----

    pub(crate) fn navigate(
        self: &Arc<Self>,
        to: String,
        opts: NavigateOptions,
    ) -> BoxFuture<'static, Result<NavigationOutcome, RouterError>> {
        let this = self.clone();
        async move {
            if this.is_disposed() {
                return Err(RouterError::Disposed);
            }
            let current = this.state();
            let mut path = this.resolve_href(&to, opts.from_route_id.as_deref(), opts.relative, &current);

            let submission = match opts.submission {
                Some(submission) if submission.is_mutation() => Some(submission),
                Some(submission) => {
                    let query = submission.form_data().map(FormData::to_query).unwrap_or_default();
                    path.search = if query.is_empty() { String::new() } else { format!("?{query}") };
                    None
                }
                None => None,
            };
            let submission = submission.map(|mut s| {
                s.form_action = format!("{}{}", path.pathname, path.search);
                s
            });

            let history_action = match opts.replace {
                Some(true) => HistoryAction::Replace,
                Some(false) => HistoryAction::Push,
                None if submission
                    .as_ref()
                    .is_some_and(|s| s.form_action == current.location.path_and_search()) =>
                {
                    HistoryAction::Replace
                }
                None => HistoryAction::Push,
            };
            let location = Location::from_path(path, opts.state);

            if let Some(next) = this.tree.match_routes(&location.pathname, &this.basename) {
                let decision =
                    run_transition_hooks(&current.matches, &next, &current.location, &location, history_action).await;
                match decision {
                    HookDecision::Proceed => {}
                    HookDecision::Cancel => {
                        tracing::info!(location = %location, "Navigation blocked by transition hook");
                        metrics::record_navigation("blocked", Instant::now());
                        return Ok(NavigationOutcome::Blocked);
                    }
                    HookDecision::Redirect(target) => {
                        tracing::info!(from = %location, to = %target, "Transition hook redirected");
                        return this.navigate(target, NavigateOptions::replace()).await;
                    }
                }
            }

            this.start_navigation(
                history_action,
                location,
                StartOptions {
                    submission,
                    ..StartOptions::default()
                },
            )
            .await
        }
        .boxed()
    }

    pub(crate) fn revalidate(self: &Arc<Self>) -> BoxFuture<'static, Result<NavigationOutcome, RouterError>> {
        let this = self.clone();
        async move {
            let restart = {
                let mut control = this.control.lock();
                if control.disposed {
                    return Err(RouterError::Disposed);
                }
                control.revalidation_required = true;
                let state = this.state();
                if state.navigation.is_submitting() || control.pending.as_ref().is_some_and(|p| p.mutation) {
                    None
                } else {
                    Some(match &control.pending {
                        Some(p) => (p.history_action, p.location.clone(), p.uninterrupted),
                        None => (state.history_action, state.location.clone(), true),
                    })
                }
            };

            match restart {
                None => {
                    tracing::debug!("Revalidation folded into the in-flight submission");
                    Ok(NavigationOutcome::Joined)
                }
                Some((history_action, location, uninterrupted)) => {
                    tracing::debug!(location = %location, uninterrupted, "Revalidating");
                    this.start_navigation(
                        history_action,
                        location,
                        StartOptions {
                            uninterrupted,
                            ..StartOptions::default()
                        },
                    )
                    .await
                }
            }
        }
        .boxed()
    }

    pub(crate) fn start_navigation(
        self: &Arc<Self>,
        history_action: HistoryAction,
        location: Location,
        opts: StartOptions,
    ) -> BoxFuture<'static, Result<NavigationOutcome, RouterError>> {
        let this = self.clone();
        async move { this.run_navigation(history_action, location, opts).await }.boxed()
    }

    // ---- pipeline ----

    async fn run_navigation(
        self: Arc<Self>,
        history_action: HistoryAction,
        location: Location,
        opts: StartOptions,
    ) -> Result<NavigationOutcome, RouterError> {
        let started = Instant::now();
        let current = self.state();
        let submission = opts.submission.clone().filter(Submission::is_mutation);

        let (id, token, revalidation_required) = {
            let mut control = self.control.lock();
            if control.disposed {
                return Err(RouterError::Disposed);
            }
            if let Some(previous) = control.pending.take() {
                tracing::debug!(navigation = previous.id, location = %previous.location, "Navigation superseded");
                previous.token.cancel();
            }
            control.next_id += 1;
            let id = control.next_id;
            let token = self.shutdown.child_token();
            if submission.is_some() {
                control.revalidation_required = true;
            }
            control.pending = Some(PendingNavigation {
                id,
                token: token.clone(),
                history_action,
                location: location.clone(),
                uninterrupted: opts.uninterrupted,
                mutation: submission.is_some(),
            });
            (id, token, control.revalidation_required)
        };
        tracing::debug!(navigation = id, location = %location, action = history_action.as_str(), "Navigation started");

        let matches = self.tree.match_routes(&location.pathname, &self.basename);
        let nav = Nav {
            id,
            token,
            history_action,
            location,
            matches: matches.clone().unwrap_or_default(),
            submission,
            opts,
            started,
        };

        let Some(matches) = matches else {
            tracing::info!(navigation = id, location = %nav.location, "No route matches location");
            return Ok(self.finish(&nav, Commit::new(Vec::new()), NavigationOutcome::NotFound));
        };

        if nav.submission.is_none()
            && !revalidation_required
            && current.initialized
            && current.location.is_hash_change_only(&nav.location)
        {
            let mut commit = Commit::new(matches);
            commit.loader_data = current.loader_data.clone();
            commit.errors = current.errors.clone();
            commit.action_data = None;
            return Ok(self.finish(&nav, commit, NavigationOutcome::Committed));
        }

        self.publish_if_current(nav.id, |state| match (&nav.submission, nav.opts.uninterrupted) {
            (Some(submission), _) => {
                state.navigation = NavigationState::Submitting {
                    location: nav.location.clone(),
                    submission: submission.clone(),
                }
            }
            (None, true) => state.revalidation = RevalidationState::Loading,
            (None, false) => {
                state.navigation = NavigationState::Loading {
                    location: nav.location.clone(),
                    submission: None,
                }
            }
        });

        let action = match nav.submission.clone() {
            Some(submission) => match self.run_action(&nav, &submission).await? {
                Step::Continue(action) => {
                    self.publish_if_current(nav.id, |state| {
                        state.navigation = NavigationState::Loading {
                            location: nav.location.clone(),
                            submission: Some(submission),
                        }
                    });
                    action
                }
                Step::Done(outcome) => return Ok(outcome),
            },
            None => ActionPhase::default(),
        };

        self.load_phase(&nav, action).await
    }

    async fn run_action(self: &Arc<Self>, nav: &Nav, submission: &Submission) -> Result<Step<ActionPhase>, RouterError> {
        let Some(target) = target_match(&nav.matches, &nav.location.search).cloned() else {
            return Ok(Step::Continue(ActionPhase::default()));
        };
        let route_id = target.route.id.clone();

        let result = match &target.route.action {
            None => {
                tracing::warn!(route_id = %route_id, method = %submission.form_method, "Submission to a route without an action");
                DataResult::Error(
                    ErrorResponse::method_not_allowed(&submission.form_method, &nav.location.pathname, &route_id).into(),
                )
            }
            Some(action) => {
                let ctx = AbortableContext::child_of(&nav.token, &route_id);
                let args = match self.handler_args(&nav.location.path_and_search(), &ctx, Some(submission.clone()), &target) {
                    Ok(args) => args,
                    Err(e) => return Ok(Step::Done(self.fail(nav, Some(route_id), FatalCause::Router(e)))),
                };
                match call_handler(HandlerKind::Action, &route_id, action, args, &ctx).await {
                    Some(result) => result.resolve_deferred().await,
                    None => return Ok(Step::Done(self.superseded(nav))),
                }
            }
        };

        if nav.token.is_cancelled() {
            result.discard();
            return Ok(Step::Done(self.superseded(nav)));
        }

        let value = match result {
            DataResult::Redirect(redirect) => {
                let idx = position_of(&nav.matches, &route_id);
                let outcome = self
                    .follow_redirect(nav, redirect, &nav.matches[..=idx], Some(submission.clone()))
                    .await?;
                return Ok(Step::Done(outcome));
            }
            DataResult::Error(error) => {
                return Ok(match find_boundary(&nav.matches, &route_id) {
                    Some(boundary) => Step::Continue(ActionPhase {
                        route_id: Some(route_id),
                        data: None,
                        result: Some(Err(error.clone())),
                        error: Some((boundary, error)),
                    }),
                    None => Step::Done(self.fail(nav, Some(route_id), FatalCause::Route(error))),
                });
            }
            DataResult::Data(value) => value,
            DataResult::Deferred(data) => data.unwrapped().unwrap_or(Value::Null),
        };

        Ok(Step::Continue(ActionPhase {
            data: Some(HashMap::from([(route_id.clone(), value.clone())])),
            route_id: Some(route_id),
            result: Some(Ok(value)),
            error: None,
        }))
    }

    async fn load_phase(self: &Arc<Self>, nav: &Nav, action: ActionPhase) -> Result<NavigationOutcome, RouterError> {
        let current = self.state();
        let (revalidation_required, cancelled_routes, busy_fetchers) = {
            let control = self.control.lock();
            let busy: HashSet<String> = control
                .fetch_redirect_keys
                .union(&control.fetch_reload_keys)
                .cloned()
                .collect();
            (control.revalidation_required, control.cancelled_deferred_routes.clone(), busy)
        };

        let current_url = self.url_for(&current.location.path_and_search());
        let next_url = self.url_for(&nav.location.path_and_search());
        let plan = LoadPlan {
            current_url: &current_url,
            current_matches: &current.matches,
            loader_data: &current.loader_data,
            next_url: &next_url,
            next_matches: &nav.matches,
            submission: nav.submission.as_ref(),
            action_route_id: action.route_id.as_deref(),
            action_result: action.result.as_ref(),
            boundary_id: action.error.as_ref().map(|(b, _)| b.as_str()),
            revalidation_required,
            force: nav.opts.force_revalidate,
            cancelled_deferred_routes: &cancelled_routes,
        };
        let to_load = matches_to_load(&plan);
        let fetcher_loads = if revalidation_required || nav.opts.force_revalidate {
            self.fetchers_to_revalidate(&plan, &nav.token, &busy_fetchers)
        } else {
            Vec::new()
        };
        let load_ids: HashSet<String> = to_load.iter().map(|m| m.route.id.clone()).collect();

        {
            let mut control = self.control.lock();
            if !control.pending.as_ref().is_some_and(|p| p.id == nav.id) {
                drop(control);
                return Ok(self.superseded(nav));
            }
            let next_ids: HashSet<&str> = nav.matches.iter().map(|m| m.route.id.as_str()).collect();
            let cancelled = control
                .active_deferreds
                .cancel_where(|id| !next_ids.contains(id) || load_ids.contains(id));
            control.cancelled_deferred_routes.extend(cancelled);
        }

        tracing::debug!(
            navigation = nav.id,
            loaders = to_load.len(),
            fetchers = fetcher_loads.len(),
            "Load phase"
        );

        let href = nav.location.path_and_search();
        let loader_calls = join_all(to_load.iter().map(|m| self.call_route_loader(m, &href, &nav.token)));
        let fetcher_calls = join_all(
            fetcher_loads
                .iter()
                .map(|f| self.call_fetch_loader(&f.target, &f.load.href, &f.ctx)),
        );
        let (results, fetcher_results) = join(loader_calls, fetcher_calls).await;

        if nav.token.is_cancelled() || !self.is_current(nav.id) {
            results.into_iter().chain(fetcher_results).flatten().for_each(DataResult::discard);
            return Ok(self.superseded(nav));
        }

        let loaded: Vec<(RouteMatch, DataResult)> = to_load
            .into_iter()
            .zip(results)
            .filter_map(|(m, r)| r.map(|r| (m, r)))
            .collect();
        let fetched: Vec<(FetcherRevalidation, DataResult)> = fetcher_loads
            .into_iter()
            .zip(fetcher_results)
            .filter_map(|(f, r)| r.map(|r| (f, r)))
            .collect();

        // First redirect wins; loaders before fetchers.
        let loader_redirect = loaded.iter().position(|(_, r)| r.is_redirect());
        let fetcher_redirect = fetched.iter().position(|(_, r)| r.is_redirect());
        if loader_redirect.is_some() || fetcher_redirect.is_some() {
            let mut chosen: Option<(RedirectResult, usize)> = None;
            for (i, (m, result)) in loaded.into_iter().enumerate() {
                match result {
                    DataResult::Redirect(redirect) if Some(i) == loader_redirect => {
                        chosen = Some((redirect, position_of(&nav.matches, &m.route.id)));
                    }
                    other => other.discard(),
                }
            }
            for (i, (f, result)) in fetched.into_iter().enumerate() {
                match result {
                    DataResult::Redirect(redirect) if chosen.is_none() && Some(i) == fetcher_redirect => {
                        self.control.lock().fetch_redirect_keys.insert(f.key.clone());
                        chosen = Some((redirect, nav.matches.len().saturating_sub(1)));
                    }
                    other => other.discard(),
                }
            }
            let Some((redirect, source)) = chosen else {
                return Ok(self.superseded(nav));
            };
            return self.follow_redirect(nav, redirect, &nav.matches[..=source], None).await;
        }

        let mut error = action.error;
        let mut loaded_data: HashMap<String, RouteData> = HashMap::new();
        let mut first_failure: Option<(String, RouteError)> = None;
        for (m, result) in loaded {
            match result {
                DataResult::Data(value) => {
                    loaded_data.insert(m.route.id.clone(), RouteData::Value(value));
                }
                DataResult::Deferred(data) => {
                    loaded_data.insert(m.route.id.clone(), RouteData::Deferred(data));
                }
                DataResult::Error(e) if first_failure.is_none() => first_failure = Some((m.route.id.clone(), e)),
                DataResult::Error(_) | DataResult::Redirect(_) => {}
            }
        }

        if let Some((route_id, e)) = first_failure {
            match find_boundary(&nav.matches, &route_id) {
                None => {
                    cancel_new_deferreds(loaded_data.values(), &current);
                    return Ok(self.fail(nav, Some(route_id), FatalCause::Route(e)));
                }
                Some(boundary) => {
                    let shallower = error.as_ref().map_or(true, |(existing, _)| {
                        position_of(&nav.matches, &boundary) < position_of(&nav.matches, existing)
                    });
                    if shallower {
                        error = Some((boundary, e));
                    }
                }
            }
        }

        let mut loader_data = HashMap::new();
        for m in &nav.matches {
            let id = &m.route.id;
            if let Some(data) = loaded_data.remove(id) {
                loader_data.insert(id.clone(), data);
            } else if !load_ids.contains(id) {
                if let Some(previous) = current.loader_data.get(id) {
                    loader_data.insert(id.clone(), previous.clone());
                }
            }
        }

        let mut errors = HashMap::new();
        if let Some((boundary, e)) = error {
            let start = position_of(&nav.matches, &boundary);
            let dropped: Vec<RouteData> = nav.matches[start..]
                .iter()
                .filter_map(|m| loader_data.remove(&m.route.id))
                .collect();
            cancel_new_deferreds(dropped.iter(), &current);
            tracing::warn!(navigation = nav.id, boundary = %boundary, error = %e, "Error captured by boundary");
            errors.insert(boundary, e);
        }

        let fetcher_results = fetched
            .into_iter()
            .filter_map(|(f, result)| {
                let result = match result {
                    DataResult::Data(value) => Ok(value),
                    DataResult::Deferred(data) => Ok(data.unwrapped().unwrap_or(Value::Null)),
                    DataResult::Error(e) => Err(e),
                    DataResult::Redirect(_) => return None,
                };
                Some(FetcherResult {
                    ctx_id: f.ctx.id(),
                    key: f.key,
                    load: f.load,
                    result,
                })
            })
            .collect();

        let mut commit = Commit::new(nav.matches.clone());
        commit.loader_data = loader_data;
        commit.errors = errors;
        commit.fetcher_results = fetcher_results;
        commit.action_data = if nav.submission.is_some() {
            Some(action.data)
        } else if nav.opts.uninterrupted {
            None
        } else {
            Some(None)
        };
        Ok(self.finish(nav, commit, NavigationOutcome::Committed))
    }

    async fn call_route_loader(&self, m: &RouteMatch, href: &str, token: &CancellationToken) -> Option<DataResult> {
        let Some(loader) = &m.route.loader else {
            return Some(DataResult::Data(Value::Null));
        };
        let ctx = AbortableContext::child_of(token, &m.route.id);
        match self.handler_args(href, &ctx, None, m) {
            Ok(args) => call_handler(HandlerKind::Loader, &m.route.id, loader, args, &ctx).await,
            Err(e) => Some(DataResult::Error(RouteError::Error(e.to_string()))),
        }
    }

    // ---- redirects ----

    async fn follow_redirect(
        self: &Arc<Self>,
        nav: &Nav,
        redirect: RedirectResult,
        source: &[RouteMatch],
        submission: Option<Submission>,
    ) -> Result<NavigationOutcome, RouterError> {
        if !self.is_current(nav.id) {
            return Ok(self.superseded(nav));
        }
        metrics::record_redirect(redirect.status);
        if nav.opts.redirect_depth >= self.max_redirects {
            let cause = FatalCause::Router(RouterError::RedirectLimit {
                limit: self.max_redirects,
            });
            return Ok(self.fail(nav, None, cause));
        }
        metrics::record_navigation("redirected", nav.started);
        let replace = nav.history_action == HistoryAction::Replace;
        self.start_redirect(
            redirect,
            source,
            &nav.location,
            submission,
            replace,
            nav.opts.redirect_depth + 1,
            Some(nav.id),
        )
        .await
    }

    /// Resolve `redirect` relative to `source` and navigate to it.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn start_redirect(
        self: &Arc<Self>,
        redirect: RedirectResult,
        source: &[RouteMatch],
        from: &Location,
        submission: Option<Submission>,
        replace: bool,
        depth: u32,
        nav_id: Option<u64>,
    ) -> Result<NavigationOutcome, RouterError> {
        let route_pathnames = contributing_pathnames(source);
        let location_pathname = strip_basename(&from.pathname, &self.basename).unwrap_or_else(|| "/".to_string());
        let cx = RedirectContext {
            origin: &self.origin,
            basename: &self.basename,
            route_pathnames: &route_pathnames,
            location_pathname: &location_pathname,
        };

        match resolve_redirect(&redirect.location, redirect.reload_document, &cx) {
            RedirectTarget::External(href) => Ok(self.redirect_external(nav_id, href, replace)),
            RedirectTarget::Internal(path) => {
                let current = self.state();
                let history_action = redirect_history_action(&path, &current.location, replace);
                let submission = submission
                    .filter(|s| redirect.preserves_method() && s.is_mutation())
                    .map(|mut s| {
                        s.form_action = format!("{}{}", path.pathname, path.search);
                        s
                    });
                tracing::info!(
                    from = %from,
                    to = %path,
                    status = redirect.status,
                    method_preserved = submission.is_some(),
                    "Following redirect"
                );
                let location = Location::from_path(path, None);
                self.start_navigation(
                    history_action,
                    location,
                    StartOptions {
                        submission,
                        force_revalidate: redirect.revalidate,
                        uninterrupted: false,
                        redirect_depth: depth,
                    },
                )
                .await
            }
        }
    }

    fn redirect_external(&self, nav_id: Option<u64>, href: String, replace: bool) -> NavigationOutcome {
        if let Some(id) = nav_id {
            let mut control = self.control.lock();
            if control.pending.as_ref().is_some_and(|p| p.id == id) {
                control.pending = None;
                for key in control.fetch_redirect_keys.drain() {
                    self.fetchers.settle(&key);
                }
                self.state.send_modify(|state| {
                    let state = Arc::make_mut(state);
                    state.navigation = NavigationState::Idle;
                    state.revalidation = RevalidationState::Idle;
                });
            }
        }
        match &self.document {
            Some(document) => {
                tracing::info!(href = %href, replace, "Redirecting outside the application");
                document.navigate(&href, replace);
            }
            None => tracing::warn!(href = %href, "External redirect with no document navigator; ignoring"),
        }
        NavigationOutcome::Redirected { href }
    }

    // ---- endings ----

    fn superseded(&self, nav: &Nav) -> NavigationOutcome {
        tracing::debug!(navigation = nav.id, location = %nav.location, "Navigation result discarded");
        metrics::record_navigation("superseded", nav.started);
        NavigationOutcome::Superseded
    }

    fn fail(&self, nav: &Nav, route_id: Option<String>, cause: FatalCause) -> NavigationOutcome {
        let fatal = FatalError {
            location: nav.location.clone(),
            route_id,
            error: cause,
        };
        {
            let mut control = self.control.lock();
            if !control.pending.as_ref().is_some_and(|p| p.id == nav.id) {
                drop(control);
                return self.superseded(nav);
            }
            control.pending = None;
            for key in drain_waiting_fetchers(&mut control) {
                self.fetchers.settle(&key);
            }
            self.state.send_modify(|state| {
                let state = Arc::make_mut(state);
                state.navigation = NavigationState::Idle;
                state.revalidation = RevalidationState::Idle;
                state.initialized = true;
                state.fatal_error = Some(fatal.clone());
            });
        }
        tracing::error!(navigation = nav.id, error = %fatal, "Navigation failed");
        metrics::record_navigation("failed", nav.started);
        NavigationOutcome::Failed(fatal)
    }

    fn finish(self: &Arc<Self>, nav: &Nav, commit: Commit, outcome: NavigationOutcome) -> NavigationOutcome {
        let mut control = self.control.lock();
        if !control.pending.as_ref().is_some_and(|p| p.id == nav.id) {
            drop(control);
            cancel_new_deferreds(commit.loader_data.values(), &self.state());
            return self.superseded(nav);
        }
        control.pending = None;
        control.revalidation_required = false;
        control.cancelled_deferred_routes.clear();
        control.active_deferreds.prune_done();

        let deferreds: Vec<(&String, &DeferredData)> = commit
            .loader_data
            .iter()
            .filter_map(|(id, data)| data.deferred().map(|d| (id, d)))
            .collect();
        let keep: HashSet<&str> = deferreds.iter().map(|(id, _)| id.as_str()).collect();
        control.active_deferreds.cancel_where(|id| !keep.contains(id));
        for (id, data) in deferreds {
            let fresh = !control.active_deferreds.get(id).is_some_and(|a| a.ptr_eq(data));
            if control.active_deferreds.track(id, data) && fresh {
                self.watch_deferred(id, data);
            }
        }

        for key in drain_waiting_fetchers(&mut control) {
            self.fetchers.settle(&key);
        }

        let mut errors = commit.errors;
        for fetched in commit.fetcher_results {
            match fetched.result {
                Ok(value) => {
                    self.fetchers
                        .finish(&fetched.key, fetched.ctx_id, Fetcher::done(Some(value)), Some(fetched.load));
                }
                Err(e) => {
                    if self.fetchers.remove_if_current(&fetched.key, fetched.ctx_id) && errors.is_empty() {
                        if let Some(boundary) = commit
                            .matches
                            .last()
                            .and_then(|leaf| find_boundary(&commit.matches, &leaf.route.id))
                        {
                            errors.insert(boundary, e);
                        }
                    }
                }
            }
        }
        self.fetchers.reset_stale_revalidations();

        if !nav.opts.uninterrupted {
            match nav.history_action {
                HistoryAction::Push => self.history.push(nav.location.clone()),
                HistoryAction::Replace => self.history.replace(nav.location.clone()),
                HistoryAction::Pop => {}
            }
        }

        let action_data = commit.action_data;
        let matches = commit.matches;
        let loader_data = commit.loader_data;
        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            state.history_action = nav.history_action;
            state.location = nav.location.clone();
            state.matches = matches;
            state.initialized = true;
            state.navigation = NavigationState::Idle;
            state.revalidation = RevalidationState::Idle;
            state.loader_data = loader_data;
            state.errors = errors;
            state.fatal_error = None;
            if let Some(action_data) = action_data {
                state.action_data = action_data;
            }
        });
        drop(control);

        tracing::info!(
            navigation = nav.id,
            location = %nav.location,
            outcome = outcome.as_str(),
            elapsed_ms = nav.started.elapsed().as_millis() as u64,
            "Navigation committed"
        );
        metrics::record_navigation(outcome.as_str(), nav.started);
        outcome
    }

    /// Re-publish state whenever a key of `data` settles.
    fn watch_deferred(self: &Arc<Self>, route_id: &str, data: &DeferredData) {
        let weak = Arc::downgrade(self);
        let route_id = route_id.to_string();
        data.subscribe(Arc::new(move |event| {
            if let SettleEvent::Settled { key, done } = event {
                tracing::debug!(route_id = %route_id, key = %key, done, "Deferred value settled");
                if let Some(controller) = weak.upgrade() {
                    controller.notify();
                }
            }
        }));
    }
}

/// Take every fetcher key waiting on the next commit.
fn drain_waiting_fetchers(control: &mut Control) -> Vec<String> {
    control
        .fetch_redirect_keys
        .drain()
        .chain(control.fetch_reload_keys.drain())
        .collect()
}

/// Cancel deferred payloads that are not already part of `state`.
fn cancel_new_deferreds<'a>(data: impl Iterator<Item = &'a RouteData>, state: &RouterState) {
    for item in data {
        if let RouteData::Deferred(deferred) = item {
            let live = state
                .loader_data
                .values()
                .any(|d| d.deferred().is_some_and(|d| d.ptr_eq(deferred)));
            if !live {
                deferred.cancel();
            }
        }
    }
}

fn position_of(matches: &[RouteMatch], route_id: &str) -> usize {
    matches
        .iter()
        .position(|m| m.route.id == route_id)
        .unwrap_or(matches.len().saturating_sub(1))
}

/// Nearest route at or above `route_id` that declares an error boundary.
pub(crate) fn find_boundary(matches: &[RouteMatch], route_id: &str) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let idx = position_of(matches, route_id);
    matches[..=idx]
        .iter()
        .rev()
        .find(|m| m.route.has_error_boundary)
        .map(|m| m.route.id.clone())
}

/// The route a submission or fetch targets: the leaf when it is an index
/// route addressed with `?index`, otherwise the deepest path-contributing match.
pub(crate) fn target_match<'a>(matches: &'a [RouteMatch], search: &str) -> Option<&'a RouteMatch> {
    let leaf = matches.last()?;
    if leaf.route.is_index() && FormData::from_query(search).get_all("index").iter().any(|v| v.is_empty()) {
        return Some(leaf);
    }
    matches
        .iter()
        .enumerate()
        .filter(|(i, m)| *i == 0 || m.route.contributes_path())
        .map(|(_, m)| m)
        .next_back()
}

pub(crate) fn contributing_pathnames(matches: &[RouteMatch]) -> Vec<String> {
    matches
        .iter()
        .enumerate()
        .filter(|(i, m)| *i == 0 || m.route.contributes_path())
        .map(|(_, m)| m.pathname_base.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{compile, RouteDef};

    fn tree() -> RouteTree {
        RouteTree::new(
            compile(vec![RouteDef::new().id("root").path("/").error_boundary(true).children([
                RouteDef::new().id("layout").child(
                    RouteDef::new()
                        .id("parent")
                        .path("parent")
                        .children([RouteDef::index_route().id("parent-index"), RouteDef::new().id("child").path(":id")]),
                ),
            ])])
            .unwrap(),
        )
    }

    #[test]
    fn test_find_boundary_walks_up() {
        let t = tree();
        let matches = t.match_routes("/parent/7", "/").unwrap();
        assert_eq!(find_boundary(&matches, "child").as_deref(), Some("root"));
        assert_eq!(find_boundary(&[], "child"), None);
    }

    #[test]
    fn test_target_match_skips_index_without_query() {
        let t = tree();
        let matches = t.match_routes("/parent", "/").unwrap();
        assert_eq!(target_match(&matches, "").unwrap().route.id, "parent");
        assert_eq!(target_match(&matches, "?index").unwrap().route.id, "parent-index");
    }

    #[test]
    fn test_contributing_pathnames_skip_layouts() {
        let t = tree();
        let matches = t.match_routes("/parent/7", "/").unwrap();
        assert_eq!(contributing_pathnames(&matches), vec!["/", "/parent", "/parent/7"]);
    }
}
