//! Job lifecycle tracking.
//!
//! A job moves `pending -> processing -> completed | error` and never leaves
//! a terminal state. See [`Job`] for the transitions and [`JobTracker`] for
//! the shared ledger.

mod job;
mod tracker;

pub use job::{Job, JobId, JobSnapshot, JobStatus, OperationKind, SourceRef};
pub use tracker::{CANCELLED, JobGuard, JobTracker};
