//! The public router handle and its builder.
//!
//! # Data Flow
//! ```text
//! RouterBuilder (RouteDef tree or RouterConfig + handlers by id)
//!     → compile + RouteTree::new
//!     → Router (Arc<Controller>)
//!         ├─ navigate / revalidate / fetch / dispose
//!         └─ state() snapshot, subscribe() watch receiver
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;
use url::Url;

use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::fetcher::{FetchOptions, Fetcher};
use crate::loader::{HandlerArgs, HandlerResult};
use crate::navigation::controller::Controller;
use crate::navigation::{
    DocumentNavigator, History, MemoryHistory, NavigateOptions, NavigationOutcome, Navigator, RouteState,
    RouterState,
};
use crate::request::FormData;
use crate::revalidation::ShouldRevalidateArgs;
use crate::routing::path::RelativeRouting;
use crate::routing::{compile, Params, RouteDef, RouteMatch, RouteTree};

/// Handle to a running router. Cheap to clone; all clones drive the same state.
#[derive(Clone)]
pub struct Router {
    inner: Arc<Controller>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// The latest published state.
    pub fn state(&self) -> Arc<RouterState> {
        self.inner.state()
    }

    /// Receiver woken on every state change, fetcher change, and deferred
    /// settlement.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RouterState>> {
        self.inner.subscribe()
    }

    pub fn routes(&self) -> &RouteTree {
        &self.inner.tree
    }

    pub fn basename(&self) -> &str {
        &self.inner.basename
    }

    pub fn history(&self) -> &Arc<dyn History> {
        &self.inner.history
    }

    /// Load the history's current location and start following POP updates.
    pub async fn initialize(&self) -> Result<NavigationOutcome, RouterError> {
        self.inner.initialize().await
    }

    pub async fn navigate(&self, to: &str, opts: NavigateOptions) -> Result<NavigationOutcome, RouterError> {
        self.inner.navigate(to.to_string(), opts).await
    }

    /// Re-run loaders for the current location (or fold into the one in flight).
    pub async fn revalidate(&self) -> Result<NavigationOutcome, RouterError> {
        self.inner.revalidate().await
    }

    /// Load or submit through the fetcher `key` without navigating.
    pub async fn fetch(&self, key: &str, href: &str, opts: FetchOptions) -> Result<(), RouterError> {
        self.inner.fetch(key, href, opts).await
    }

    pub fn fetcher(&self, key: &str) -> Option<Fetcher> {
        self.inner.fetcher(key)
    }

    pub fn fetchers(&self) -> BTreeMap<String, Fetcher> {
        self.inner.all_fetchers()
    }

    pub fn delete_fetcher(&self, key: &str) {
        self.inner.delete_fetcher(key);
    }

    /// The href a link to `to` from the leaf route would point at.
    pub fn create_href(&self, to: &str) -> String {
        self.inner
            .resolve_href(to, None, RelativeRouting::Route, &self.inner.state())
            .to_href()
    }

    /// Cancel everything in flight and stop listening to history.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Router")
            .field("basename", &self.inner.basename)
            .field("location", &state.location.to_href())
            .field("navigation", &state.navigation)
            .finish()
    }
}

impl Navigator for Router {
    fn navigate(&self, to: &str, opts: NavigateOptions) -> BoxFuture<'static, Result<NavigationOutcome, RouterError>> {
        self.inner.navigate(to.to_string(), opts)
    }

    fn go_back(&self) {
        self.inner.history.go(-1);
    }
}

impl RouteState for Router {
    fn params(&self) -> Params {
        self.state().leaf().map(|m| m.params.clone()).unwrap_or_default()
    }

    fn query(&self) -> FormData {
        FormData::from_query(&self.state().location.search)
    }

    fn matches(&self) -> Vec<RouteMatch> {
        self.state().matches.clone()
    }
}

/// Builds a `Router` from route definitions or a `RouterConfig`.
pub struct RouterBuilder {
    routes: Vec<RouteDef>,
    basename: String,
    origin: String,
    max_redirects: u32,
    history: Option<Arc<dyn History>>,
    document: Option<Arc<dyn DocumentNavigator>>,
    unbound: Vec<String>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    pub fn new() -> Self {
        let defaults = RouterConfig::default();
        Self {
            routes: Vec::new(),
            basename: defaults.basename,
            origin: defaults.origin,
            max_redirects: defaults.max_redirects,
            history: None,
            document: None,
            unbound: Vec::new(),
        }
    }

    /// Start from a validated configuration; bind handlers afterwards by id.
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            routes: config.route_defs(),
            basename: config.basename.clone(),
            origin: config.origin.clone(),
            max_redirects: config.max_redirects,
            ..Self::new()
        }
    }

    pub fn route(mut self, route: RouteDef) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(mut self, routes: impl IntoIterator<Item = RouteDef>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = basename.into();
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Defaults to a `MemoryHistory` at `/`.
    pub fn history(mut self, history: Arc<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    /// Receives redirects that leave the application.
    pub fn document_navigator(mut self, navigator: Arc<dyn DocumentNavigator>) -> Self {
        self.document = Some(navigator);
        self
    }

    fn bind(mut self, id: &str, f: impl FnOnce(RouteDef) -> RouteDef) -> Self {
        match self.routes.iter_mut().find_map(|r| r.find_mut(id)) {
            Some(def) => *def = f(std::mem::take(def)),
            None => self.unbound.push(id.to_string()),
        }
        self
    }

    pub fn loader<F, Fut>(self, route_id: &str, f: F) -> Self
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind(route_id, |def| def.loader(f))
    }

    pub fn action<F, Fut>(self, route_id: &str, f: F) -> Self
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind(route_id, |def| def.action(f))
    }

    pub fn should_revalidate<F>(self, route_id: &str, f: F) -> Self
    where
        F: Fn(&ShouldRevalidateArgs) -> bool + Send + Sync + 'static,
    {
        self.bind(route_id, |def| def.should_revalidate(f))
    }

    pub fn build(self) -> Result<Router, RouterError> {
        if let Some(id) = self.unbound.into_iter().next() {
            return Err(RouterError::InvalidRoute {
                route_id: id,
                message: "no route with this id to bind a handler to".into(),
            });
        }
        let origin = Url::parse(&self.origin).map_err(|_| RouterError::InvalidUrl(self.origin.clone()))?;
        let basename = normalize_basename(&self.basename);
        let tree = RouteTree::new(compile(self.routes)?);
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(MemoryHistory::default()) as Arc<dyn History>);

        tracing::info!(
            branches = tree.branches().len(),
            basename = %basename,
            origin = %origin,
            "Router built"
        );
        Ok(Router {
            inner: Controller::new(tree, basename, origin, self.max_redirects, history, self.document),
        })
    }
}

fn normalize_basename(basename: &str) -> String {
    let trimmed = basename.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
