//! Route definitions and their compiled form.
//!
//! # Responsibilities
//! - `RouteDef`: the builder applications (or config files) describe routes with
//! - `RouteNode`: the immutable compiled node the matcher and controller read
//! - Fail fast on malformed trees (duplicate ids, bad nesting, bad patterns)
//!
//! # Design Decisions
//! - Ids default to the node's position in the tree (`"0"`, `"0-1"`, ...)
//! - An absolute child path must start with its parent's resolved path
//! - A `Redirect` route behaves as a route whose loader always answers 302

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;

use crate::error::RouterError;
use crate::loader::response::Response;
use crate::loader::{HandlerArgs, HandlerFn, HandlerOutput, HandlerResult};
use crate::navigation::hooks::{HookDecision, Transition, TransitionHook};
use crate::revalidation::{ShouldRevalidateArgs, ShouldRevalidateFn};
use crate::routing::path::join_paths;
use crate::routing::pattern::PathPattern;

/// A route as described by the application, before compilation.
#[derive(Clone, Default)]
pub struct RouteDef {
    pub(crate) id: Option<String>,
    pub(crate) path: Option<String>,
    pub(crate) index: bool,
    pub(crate) case_sensitive: bool,
    pub(crate) error_boundary: bool,
    pub(crate) redirect: Option<String>,
    pub(crate) loader: Option<HandlerFn>,
    pub(crate) action: Option<HandlerFn>,
    pub(crate) should_revalidate: Option<ShouldRevalidateFn>,
    pub(crate) on_enter: Option<TransitionHook>,
    pub(crate) on_leave: Option<TransitionHook>,
    pub(crate) children: Vec<RouteDef>,
}

impl RouteDef {
    /// A pathless route; add a path, children or handlers with the builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// An index route, matched when its parent's remaining pathname is empty.
    pub fn index_route() -> Self {
        Self {
            index: true,
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn error_boundary(mut self, yes: bool) -> Self {
        self.error_boundary = yes;
        self
    }

    /// Make this route redirect every navigation to `to`.
    pub fn redirect(mut self, to: impl Into<String>) -> Self {
        self.redirect = Some(to.into());
        self
    }

    pub fn loader<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.loader = Some(Arc::new(move |args| f(args).boxed()));
        self
    }

    pub fn action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.action = Some(Arc::new(move |args| f(args).boxed()));
        self
    }

    pub fn should_revalidate<F>(mut self, f: F) -> Self
    where
        F: Fn(&ShouldRevalidateArgs) -> bool + Send + Sync + 'static,
    {
        self.should_revalidate = Some(Arc::new(f));
        self
    }

    pub fn on_enter<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Transition) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookDecision> + Send + 'static,
    {
        self.on_enter = Some(Arc::new(move |t| f(t).boxed()));
        self
    }

    pub fn on_leave<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Transition) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookDecision> + Send + 'static,
    {
        self.on_leave = Some(Arc::new(move |t| f(t).boxed()));
        self
    }

    pub fn child(mut self, child: RouteDef) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = RouteDef>) -> Self {
        self.children.extend(children);
        self
    }

    /// Find a descendant (or self) by explicit id.
    pub(crate) fn find_mut(&mut self, id: &str) -> Option<&mut RouteDef> {
        if self.id.as_deref() == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }
}

impl fmt::Debug for RouteDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDef")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("index", &self.index)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// What kind of route a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    /// Matches only an empty remaining pathname; never has children.
    Index,
    /// Pathless wrapper; contributes no segments and forms no branch alone.
    Layout,
    /// A path pattern relative to the parent.
    Path(PathPattern),
    /// A path pattern whose every match redirects to `to`.
    Redirect { pattern: PathPattern, to: String },
}

/// A compiled, immutable route.
pub struct RouteNode {
    pub id: String,
    pub kind: RouteKind,
    pub case_sensitive: bool,
    pub has_error_boundary: bool,
    pub(crate) loader: Option<HandlerFn>,
    pub(crate) action: Option<HandlerFn>,
    pub(crate) should_revalidate: Option<ShouldRevalidateFn>,
    pub(crate) on_enter: Option<TransitionHook>,
    pub(crate) on_leave: Option<TransitionHook>,
    pub children: Vec<Arc<RouteNode>>,
}

impl RouteNode {
    pub fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    pub fn is_index(&self) -> bool {
        matches!(self.kind, RouteKind::Index)
    }

    pub fn pattern(&self) -> Option<&PathPattern> {
        match &self.kind {
            RouteKind::Path(pattern) | RouteKind::Redirect { pattern, .. } => Some(pattern),
            RouteKind::Index | RouteKind::Layout => None,
        }
    }

    /// Whether this route adds to the pathname relative paths resolve against.
    pub fn contributes_path(&self) -> bool {
        match &self.kind {
            RouteKind::Path(p) | RouteKind::Redirect { pattern: p, .. } => !p.segments().is_empty(),
            RouteKind::Index | RouteKind::Layout => false,
        }
    }
}

impl fmt::Debug for RouteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("has_loader", &self.has_loader())
            .field("has_action", &self.has_action())
            .field("has_error_boundary", &self.has_error_boundary)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Compile route definitions into nodes.
pub fn compile(defs: Vec<RouteDef>) -> Result<Vec<Arc<RouteNode>>, RouterError> {
    let mut ids = HashSet::new();
    compile_level(defs, &[], "/", &mut ids)
}

fn compile_level(
    defs: Vec<RouteDef>,
    position: &[usize],
    parent_path: &str,
    ids: &mut HashSet<String>,
) -> Result<Vec<Arc<RouteNode>>, RouterError> {
    let mut nodes = Vec::with_capacity(defs.len());
    for (i, def) in defs.into_iter().enumerate() {
        let mut here = position.to_vec();
        here.push(i);
        nodes.push(Arc::new(compile_one(def, &here, parent_path, ids)?));
    }
    Ok(nodes)
}

fn compile_one(
    def: RouteDef,
    position: &[usize],
    parent_path: &str,
    ids: &mut HashSet<String>,
) -> Result<RouteNode, RouterError> {
    let id = def.id.clone().unwrap_or_else(|| {
        position.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("-")
    });
    let invalid = |message: String| RouterError::InvalidRoute {
        route_id: id.clone(),
        message,
    };

    if !ids.insert(id.clone()) {
        return Err(invalid("duplicate route id".into()));
    }
    if def.index && !def.children.is_empty() {
        return Err(invalid("index routes must not have child routes".into()));
    }
    if def.index && def.redirect.is_some() {
        return Err(invalid("index routes cannot redirect".into()));
    }

    let relative = match &def.path {
        Some(path) if path.starts_with('/') => {
            let parent = parent_path.trim_end_matches('/');
            if !path.starts_with(parent) || !(path.len() == parent.len() || path[parent.len()..].starts_with('/')) {
                return Err(invalid(format!(
                    "absolute route path \"{path}\" nested under path \"{parent_path}\" is not valid; \
                     an absolute child route path must start with the combined path of all its parent routes"
                )));
            }
            Some(path[parent.len()..].to_string())
        }
        other => other.clone(),
    };
    let full_path = join_paths(&[parent_path, relative.as_deref().unwrap_or("")]);

    let compile_pattern = |p: &str| PathPattern::parse(p).map_err(|e| invalid(e.to_string()));
    let kind = match (def.index, &relative, &def.redirect) {
        (true, _, _) => RouteKind::Index,
        (false, None, Some(_)) => return Err(invalid("redirect routes need a path".into())),
        (false, None, None) => RouteKind::Layout,
        (false, Some(p), None) => RouteKind::Path(compile_pattern(p)?),
        (false, Some(p), Some(to)) => RouteKind::Redirect {
            pattern: compile_pattern(p)?,
            to: to.clone(),
        },
    };

    let loader = match &kind {
        RouteKind::Redirect { to, .. } => Some(redirect_loader(to.clone())),
        _ => def.loader,
    };

    let children = compile_level(def.children, position, &full_path, ids)?;

    Ok(RouteNode {
        id,
        kind,
        case_sensitive: def.case_sensitive,
        has_error_boundary: def.error_boundary,
        loader,
        action: def.action,
        should_revalidate: def.should_revalidate,
        on_enter: def.on_enter,
        on_leave: def.on_leave,
        children,
    })
}

fn redirect_loader(to: String) -> HandlerFn {
    Arc::new(move |_args: HandlerArgs| {
        let to = to.clone();
        async move { Ok(HandlerOutput::Response(Response::redirect(&to))) }.boxed()
    })
}
