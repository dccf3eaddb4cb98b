//! Deferred tracker subsystem.
//!
//! # Data Flow
//! ```text
//! Loader returns defer().value(..).pending(..).build()
//!     → data.rs spawns each pending future, one DeferredValue slot per key
//!     → Controller commits with keys still pending
//!     → tracker.rs remembers the payload per route while it is live
//!
//! Route reused by the next navigation   → payload carried forward untouched
//! Route left, reloaded or superseded    → payload.cancel() → slots Aborted
//! Pending future settles later           → slot resolved, listeners told
//! ```
//!
//! # Design Decisions
//! - Abort is one-way; late settlement after cancel is ignored silently
//! - Actions and fetchers never expose pending slots; they await resolve_data()

pub mod data;
pub mod tracker;
pub mod value;

pub use data::{defer, DeferredBuilder, DeferredData, DeferredEntry, SettleEvent, SettleListener};
pub use tracker::ActiveDeferreds;
pub use value::{DeferredState, DeferredValue};
