//! Navigation: history, transitions and the controller that commits them.
//!
//! # Data Flow
//! ```text
//! navigate(to) ──► resolve href ──► transition hooks ──► start_navigation
//!                                                            │
//!          ┌──────────────── supersede previous ◄────────────┤
//!          ▼                                                 ▼
//!   action (mutations) ──► redirect? ──► loaders ──► commit ──► history push/replace
//!                                                      │
//!                                                      └──► watch::Sender<RouterState>
//! ```
//!
//! # Design Decisions
//! - Only the latest navigation may commit; older ones are cancelled and
//!   their results dropped
//! - History is written at commit, never before, so a cancelled navigation
//!   leaves no trace in the stack

pub mod capability;
pub mod controller;
pub mod history;
pub mod hooks;
pub mod location;
pub mod redirect;
pub mod state;

pub use capability::{Navigator, RouteState};
pub use controller::{NavigateOptions, NavigationOutcome};
pub use history::{History, HistoryAction, HistoryListener, HistoryUpdate, MemoryHistory};
pub use hooks::{HookDecision, Transition, TransitionHook};
pub use location::{Location, Path};
pub use redirect::{DocumentNavigator, RedirectTarget};
pub use state::{NavigationState, RevalidationState, RouteData, RouterState};
