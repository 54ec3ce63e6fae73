//! Failure, reconnect and backoff policies.
//!
//! ## Contents
//! - [`FailurePolicy`] what the executor does when a stage does not complete
//! - [`ReconnectPolicy`] how often the bus re-dials a lost transport
//! - [`BackoffPolicy`] how reconnect delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization of those delays
//!
//! ## Quick wiring
//! ```text
//! RunConfig { failure_policy: FailurePolicy, .. } ──► StageExecutor (continue / abort)
//! BusConfig { reconnect: ReconnectPolicy { attempts, backoff } } ──► EventBus pump
//! ```

mod backoff;
mod failure;
mod jitter;
mod reconnect;

pub use backoff::BackoffPolicy;
pub use failure::FailurePolicy;
pub use jitter::JitterPolicy;
pub use reconnect::ReconnectPolicy;
