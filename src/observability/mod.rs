//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Controller, fetchers, deferred tracker produce:
//!     → tracing events (state transitions, failures)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs installs a fmt subscriber for the CLI
//!     → Embedding applications install their own subscriber/recorder
//! ```
//!
//! # Design Decisions
//! - Structured fields, never formatted strings, for ids and locations
//! - Metrics are facade calls; cheap no-ops without a recorder

pub mod logging;
pub mod metrics;
