//! Router metrics.
//!
//! # Metrics
//! - `router_navigations_total` (counter): finished navigations by outcome
//! - `router_navigation_duration_seconds` (histogram): dispatch to settle
//! - `router_handler_calls_total` (counter): loader/action calls by kind, outcome
//! - `router_redirects_total` (counter): followed redirects by status
//! - `router_deferred_aborted_total` (counter): deferred keys aborted
//! - `router_fetches_total` (counter): fetcher operations by kind
//!
//! # Design Decisions
//! - Facade only; the embedding application installs an exporter
//! - Without a recorder every call is a no-op

use std::time::Instant;

pub fn record_navigation(outcome: &'static str, started: Instant) {
    metrics::counter!("router_navigations_total", "outcome" => outcome).increment(1);
    metrics::histogram!("router_navigation_duration_seconds")
        .record(started.elapsed().as_secs_f64());
}

pub fn record_handler_call(kind: &'static str, outcome: &'static str) {
    metrics::counter!("router_handler_calls_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}

pub fn record_redirect(status: u16) {
    metrics::counter!("router_redirects_total", "status" => status.to_string()).increment(1);
}

pub fn record_deferred_aborted(count: u64) {
    if count > 0 {
        metrics::counter!("router_deferred_aborted_total").increment(count);
    }
}

pub fn record_fetch(kind: &'static str) {
    metrics::counter!("router_fetches_total", "kind" => kind).increment(1);
}
