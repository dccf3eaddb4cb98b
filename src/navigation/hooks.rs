//! Transition hooks: async guards run before a push/replace navigation.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::navigation::history::HistoryAction;
use crate::navigation::location::Location;
use crate::routing::{Params, RouteMatch};

/// What a hook sees.
#[derive(Debug, Clone)]
pub struct Transition {
    pub route_id: String,
    pub from: Location,
    pub to: Location,
    /// Params of the branch being left (`on_leave`) or entered (`on_enter`).
    pub params: Params,
    pub history_action: HistoryAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    Proceed,
    Cancel,
    /// Abandon this transition and replace-navigate to the target instead.
    Redirect(String),
}

pub type TransitionHook = Arc<dyn Fn(Transition) -> BoxFuture<'static, HookDecision> + Send + Sync>;

/// Routes left by a transition, leaf first.
fn leaving<'a>(current: &'a [RouteMatch], next: &[RouteMatch]) -> Vec<&'a RouteMatch> {
    current
        .iter()
        .filter(|c| !next.iter().any(|n| n.route.id == c.route.id && n.pathname == c.pathname))
        .rev()
        .collect()
}

/// Routes entered by a transition, root first.
fn entering<'a>(current: &[RouteMatch], next: &'a [RouteMatch]) -> Vec<&'a RouteMatch> {
    next.iter()
        .filter(|n| !current.iter().any(|c| c.route.id == n.route.id && c.pathname == n.pathname))
        .collect()
}

/// Run `on_leave` hooks (leaf to root), then `on_enter` hooks (root to leaf),
/// one at a time. The first non-`Proceed` decision wins.
pub(crate) async fn run_transition_hooks(
    current: &[RouteMatch],
    next: &[RouteMatch],
    from: &Location,
    to: &Location,
    history_action: HistoryAction,
) -> HookDecision {
    let transition = |m: &RouteMatch| Transition {
        route_id: m.route.id.clone(),
        from: from.clone(),
        to: to.clone(),
        params: m.params.clone(),
        history_action,
    };

    let leave = leaving(current, next)
        .into_iter()
        .filter_map(|m| m.route.on_leave.clone().map(|hook| (hook, transition(m))));
    let enter = entering(current, next)
        .into_iter()
        .filter_map(|m| m.route.on_enter.clone().map(|hook| (hook, transition(m))));

    for (hook, transition) in leave.chain(enter).collect::<Vec<_>>() {
        let route_id = transition.route_id.clone();
        let decision = hook(transition).await;
        if decision != HookDecision::Proceed {
            tracing::debug!(route_id = %route_id, decision = ?decision, "Transition hook intervened");
            return decision;
        }
    }
    HookDecision::Proceed
}
