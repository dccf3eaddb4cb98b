//! Deciding which routes load during a load phase.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use url::Url;

use crate::error::RouteError;
use crate::navigation::state::RouteData;
use crate::request::Submission;
use crate::revalidation::ShouldRevalidateArgs;
use crate::routing::pattern::SPLAT_PARAM;
use crate::routing::{RouteMatch, RouteNode};

/// Inputs to one reuse decision.
pub struct LoadPlan<'a> {
    pub current_url: &'a Url,
    pub current_matches: &'a [RouteMatch],
    pub loader_data: &'a HashMap<String, RouteData>,
    pub next_url: &'a Url,
    pub next_matches: &'a [RouteMatch],
    pub submission: Option<&'a Submission>,
    /// Route whose action ran before this load.
    pub action_route_id: Option<&'a str>,
    pub action_result: Option<&'a Result<Value, RouteError>>,
    /// Boundary already holding an action error; it and its descendants skip loading.
    pub boundary_id: Option<&'a str>,
    pub revalidation_required: bool,
    /// Ignore `should_revalidate` opt-outs.
    pub force: bool,
    pub cancelled_deferred_routes: &'a HashSet<String>,
}

impl LoadPlan<'_> {
    fn args(&self, current: Option<&RouteMatch>, next: &RouteMatch, default: bool) -> ShouldRevalidateArgs {
        ShouldRevalidateArgs {
            current_url: self.current_url.clone(),
            current_params: current.map(|m| m.params.clone()).unwrap_or_default(),
            next_url: self.next_url.clone(),
            next_params: next.params.clone(),
            form_method: self.submission.map(|s| s.form_method.clone()),
            form_action: self.submission.map(|s| s.form_action.clone()),
            form_data: self.submission.and_then(|s| s.form_data().cloned()),
            action_result: self.action_result.cloned(),
            default_should_revalidate: default,
        }
    }

    fn default_revalidate(&self) -> bool {
        self.revalidation_required
            || self.current_url.as_str() == self.next_url.as_str()
            || self.current_url.query() != self.next_url.query()
    }
}

/// Next-branch matches whose loaders must run.
pub fn matches_to_load(plan: &LoadPlan<'_>) -> Vec<RouteMatch> {
    let candidates = match plan.boundary_id {
        Some(boundary) => {
            let end = plan
                .next_matches
                .iter()
                .position(|m| m.route.id == boundary)
                .unwrap_or(plan.next_matches.len());
            &plan.next_matches[..end]
        }
        None => plan.next_matches,
    };

    candidates
        .iter()
        .filter(|next| next.route.has_loader())
        .filter(|next| {
            let id = next.route.id.as_str();
            let current = plan.current_matches.iter().find(|m| m.route.id == id);

            let Some(current) = current else {
                return true;
            };
            if !plan.loader_data.contains_key(id)
                || plan.cancelled_deferred_routes.contains(id)
                || is_new_route_instance(current, next)
            {
                return true;
            }
            if plan.force || plan.action_route_id == Some(id) {
                return true;
            }

            let default = plan.default_revalidate();
            match &next.route.should_revalidate {
                Some(predicate) => predicate(&plan.args(Some(current), next, default)),
                None => default,
            }
        })
        .cloned()
        .collect()
}

fn is_new_route_instance(current: &RouteMatch, next: &RouteMatch) -> bool {
    current.pathname != next.pathname
        || (current.route.pattern().is_some_and(|p| p.has_splat())
            && current.params.get(SPLAT_PARAM) != next.params.get(SPLAT_PARAM))
}

/// Whether an idle fetcher bound to `route` reloads during this load phase.
pub fn fetcher_should_revalidate(route: &RouteNode, plan: &LoadPlan<'_>, next: &RouteMatch) -> bool {
    if plan.force {
        return true;
    }
    match &route.should_revalidate {
        Some(predicate) => predicate(&plan.args(None, next, true)),
        None => true,
    }
}
