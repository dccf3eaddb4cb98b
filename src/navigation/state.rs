//! The published router state.

use std::collections::HashMap;

use serde_json::Value;

use crate::deferred::DeferredData;
use crate::error::{FatalError, RouteError};
use crate::navigation::history::HistoryAction;
use crate::navigation::location::Location;
use crate::request::Submission;
use crate::routing::RouteMatch;

/// Loader data for one route.
#[derive(Debug, Clone)]
pub enum RouteData {
    Value(Value),
    /// Critical keys are ready; the rest resolve after commit.
    Deferred(DeferredData),
}

impl RouteData {
    pub fn value(&self) -> Option<&Value> {
        match self {
            RouteData::Value(value) => Some(value),
            RouteData::Deferred(_) => None,
        }
    }

    pub fn deferred(&self) -> Option<&DeferredData> {
        match self {
            RouteData::Deferred(data) => Some(data),
            RouteData::Value(_) => None,
        }
    }
}

/// In-flight navigation work.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum NavigationState {
    #[default]
    Idle,
    Loading {
        location: Location,
        /// Present while loaders run after an action.
        submission: Option<Submission>,
    },
    Submitting {
        location: Location,
        submission: Submission,
    },
}

impl NavigationState {
    pub fn is_idle(&self) -> bool {
        matches!(self, NavigationState::Idle)
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self, NavigationState::Submitting { .. })
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            NavigationState::Idle => None,
            NavigationState::Loading { location, .. } | NavigationState::Submitting { location, .. } => {
                Some(location)
            }
        }
    }
}

/// Background revalidation that does not change the location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevalidationState {
    #[default]
    Idle,
    Loading,
}

/// Snapshot of everything the router knows. Replaced atomically on commit.
#[derive(Debug, Clone)]
pub struct RouterState {
    pub history_action: HistoryAction,
    pub location: Location,
    pub matches: Vec<RouteMatch>,
    /// The initial load committed.
    pub initialized: bool,
    pub navigation: NavigationState,
    pub revalidation: RevalidationState,
    pub loader_data: HashMap<String, RouteData>,
    /// Set only by the most recent action.
    pub action_data: Option<HashMap<String, Value>>,
    /// At most one entry: the boundary that absorbed an error.
    pub errors: HashMap<String, RouteError>,
    pub fatal_error: Option<FatalError>,
}

impl RouterState {
    pub(crate) fn new(location: Location, matches: Vec<RouteMatch>) -> Self {
        Self {
            history_action: HistoryAction::Pop,
            location,
            matches,
            initialized: false,
            navigation: NavigationState::Idle,
            revalidation: RevalidationState::Idle,
            loader_data: HashMap::new(),
            action_data: None,
            errors: HashMap::new(),
            fatal_error: None,
        }
    }

    pub fn loader_value(&self, route_id: &str) -> Option<&Value> {
        self.loader_data.get(route_id).and_then(RouteData::value)
    }

    pub fn deferred(&self, route_id: &str) -> Option<&DeferredData> {
        self.loader_data.get(route_id).and_then(RouteData::deferred)
    }

    /// Matches that render: everything down to the boundary holding an error.
    pub fn rendered_matches(&self) -> &[RouteMatch] {
        match self
            .matches
            .iter()
            .position(|m| self.errors.contains_key(&m.route.id))
        {
            Some(idx) => &self.matches[..=idx],
            None => &self.matches,
        }
    }

    pub fn leaf(&self) -> Option<&RouteMatch> {
        self.matches.last()
    }
}
