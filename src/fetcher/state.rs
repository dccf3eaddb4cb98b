//! Fetcher records.

use serde_json::Value;

use crate::request::Submission;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetcherState {
    #[default]
    Idle,
    Loading,
    Submitting,
}

/// What callers see for one fetcher key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fetcher {
    pub state: FetcherState,
    /// Last settled data; kept while a new load is in flight.
    pub data: Option<Value>,
    pub submission: Option<Submission>,
}

impl Fetcher {
    pub(crate) fn loading(data: Option<Value>, submission: Option<Submission>) -> Self {
        Self {
            state: FetcherState::Loading,
            data,
            submission,
        }
    }

    pub(crate) fn submitting(data: Option<Value>, submission: Submission) -> Self {
        Self {
            state: FetcherState::Submitting,
            data,
            submission: Some(submission),
        }
    }

    pub(crate) fn done(data: Option<Value>) -> Self {
        Self {
            state: FetcherState::Idle,
            data,
            submission: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == FetcherState::Idle
    }
}
