//! Request builder subsystem.
//!
//! # Data Flow
//! ```text
//! navigation / fetcher operation
//!     → context.rs (one AbortableContext per route invocation,
//!                   child of the operation's cancellation token)
//!     → submission.rs (method, encoding and body of a form submission)
//!     → request.rs (URL + method + body + abort signal handed to handlers)
//! ```
//!
//! # Design Decisions
//! - Cancellation is an explicit token, never inferred from identity checks
//! - Cancelling a parent token cancels every context derived from it
//! - Handlers only see a read-only `AbortSignal`

pub mod context;
pub mod request;
pub mod submission;

pub use context::{AbortSignal, AbortableContext};
pub use request::Request;
pub use submission::{FormData, FormEncType, Submission, SubmissionBody};
