//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at build):
//!     RouteDef[] (builder or config)
//!     → route.rs (ids, nesting checks, RouteKind)
//!     → pattern.rs (typed segments, optional explosion)
//!     → matcher.rs (flatten into branches, score, rank)
//!     → Freeze as immutable RouteTree
//!
//! Navigation:
//!     pathname
//!     → path.rs (strip basename)
//!     → matcher.rs (first ranked branch that consumes the pathname)
//!     → Return: Vec<RouteMatch> or None
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable at runtime
//! - No regex; segment-by-segment comparison
//! - Deterministic: ties resolve to declaration order

pub mod matcher;
pub mod path;
pub mod pattern;
pub mod route;

pub use matcher::{Branch, Params, RouteMatch, RouteTree};
pub use path::{resolve_to, RelativeRouting};
pub use route::{compile, RouteDef, RouteKind, RouteNode};
