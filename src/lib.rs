//! Data router: route matching, data loading and navigation state.
//!
//! # Architecture Overview
//!
//! ```text
//!   navigate / fetch / revalidate / POP
//!            │
//!            ▼
//!   ┌──────────────────┐     ┌────────────┐
//!   │    navigation    │────▶│  routing   │  match + rank branches
//!   │    controller    │     └────────────┘
//!   │                  │     ┌────────────┐
//!   │                  │────▶│revalidation│  which loaders run
//!   │                  │     └────────────┘
//!   │                  │     ┌────────────┐
//!   │                  │────▶│   loader   │  action / loaders (spawned, cancellable)
//!   │                  │     └────────────┘
//!   │                  │     ┌────────────┐
//!   │                  │────▶│  deferred  │  streamed values, aborted on leave
//!   └────────┬─────────┘     └────────────┘
//!            │ commit
//!            ▼
//!   watch::Sender<RouterState>  +  History push/replace
//! ```

pub mod config;
pub mod deferred;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod navigation;
pub mod observability;
pub mod request;
pub mod revalidation;
pub mod router;
pub mod routing;

pub use error::{ErrorResponse, FatalCause, FatalError, RouteError, RouterError};
pub use fetcher::{FetchOptions, Fetcher, FetcherState};
pub use loader::{HandlerArgs, HandlerError, HandlerOutput, HandlerResult, Response};
pub use navigation::{
    HistoryAction, Location, MemoryHistory, NavigateOptions, NavigationOutcome, NavigationState, RouterState,
};
pub use request::{FormData, Submission};
pub use router::{Router, RouterBuilder};
pub use routing::RouteDef;
