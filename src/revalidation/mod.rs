//! Revalidation coordinator subsystem.
//!
//! # Data Flow
//! ```text
//! Load phase of a navigation / revalidate() / fetcher submission
//!     → coordinator.rs::matches_to_load
//!         new route, new params, missing data, cancelled deferred → load
//!         otherwise default = revalidation required | same URL | search changed
//!         route.should_revalidate(args) may override the default
//!     → coordinator.rs::fetcher_should_revalidate for idle GET fetchers
//!     → Controller runs the selected loaders; everything else is reused
//! ```
//!
//! # Design Decisions
//! - The submitted route always reloads; so does everything when a redirect
//!   forces revalidation
//! - Reused routes keep their exact data (deferred handles included)

pub mod coordinator;

use std::sync::Arc;

use http::Method;
use serde_json::Value;
use url::Url;

use crate::error::RouteError;
use crate::request::FormData;
use crate::routing::Params;

/// Everything a `should_revalidate` predicate gets to look at.
#[derive(Debug, Clone)]
pub struct ShouldRevalidateArgs {
    pub current_url: Url,
    pub current_params: Params,
    pub next_url: Url,
    pub next_params: Params,
    pub form_method: Option<Method>,
    pub form_action: Option<String>,
    pub form_data: Option<FormData>,
    /// Result of the action that triggered this load, if any.
    pub action_result: Option<Result<Value, RouteError>>,
    /// What the router would do without the predicate.
    pub default_should_revalidate: bool,
}

/// A route's opt-out/opt-in hook for reloading.
pub type ShouldRevalidateFn = Arc<dyn Fn(&ShouldRevalidateArgs) -> bool + Send + Sync>;

pub use coordinator::{fetcher_should_revalidate, matches_to_load, LoadPlan};
