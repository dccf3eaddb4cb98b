//! Fetchers: keyed, concurrent loads and submissions that do not navigate.
//!
//! # Responsibilities
//! - Track one `Fetcher` record per key
//! - Join fetcher results into navigation revalidation
//!
//! # Design Decisions
//! - Records live in a `DashMap` beside the router state, not inside it;
//!   changes wake `Router::subscribe` receivers without a new snapshot

pub mod manager;
pub mod state;

pub use manager::FetchOptions;
pub use state::{Fetcher, FetcherState};
