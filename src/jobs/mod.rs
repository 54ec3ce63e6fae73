//! Dispatched jobs and the correlation of their returns.
//!
//! - [`Job`] the per-job state machine (expected set, returns, deadline)
//! - [`JobCorrelator`] feeds a job from the bus until it is terminal

mod correlator;
mod job;

pub use correlator::JobCorrelator;
pub use job::{Job, JobId, JobStatus, LateArrival, Observation, TargetId};
