//! Narrow interfaces for code that needs to navigate or read the current
//! match without holding a whole `Router`.

use futures::future::BoxFuture;

use crate::error::RouterError;
use crate::navigation::controller::{NavigateOptions, NavigationOutcome};
use crate::request::FormData;
use crate::routing::{Params, RouteMatch};

pub trait Navigator: Send + Sync {
    fn navigate(&self, to: &str, opts: NavigateOptions) -> BoxFuture<'static, Result<NavigationOutcome, RouterError>>;

    fn replace(&self, to: &str) -> BoxFuture<'static, Result<NavigationOutcome, RouterError>> {
        self.navigate(to, NavigateOptions::replace())
    }

    /// Step back one history entry; the resulting POP navigates.
    fn go_back(&self);
}

/// Read access to the committed match.
pub trait RouteState: Send + Sync {
    /// Params of the leaf match.
    fn params(&self) -> Params;

    /// Parsed search string of the committed location.
    fn query(&self) -> FormData;

    fn matches(&self) -> Vec<RouteMatch>;
}
