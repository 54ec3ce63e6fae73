//! Bus events: data model, tag matching, transport seam and the bus itself.
//!
//! ## Contents
//! - [`Event`], [`EventData`], [`RawMessage`] tagged event payloads
//! - [`TagPattern`], [`matches`] shell-glob tag matching
//! - [`Transport`], [`LocalTransport`] the wire underneath the bus
//! - [`EventBus`], [`Subscription`], [`NextEvent`] publish/subscribe
//!
//! ## Quick reference
//! - **Publishers**: dispatchers and agents (`job/<id>/new`, `job/<id>/ret/<target>`).
//! - **Consumers**: `JobCorrelator` (one job's returns) and `tail` (operator view).

mod bus;
mod event;
mod pattern;
mod transport;

pub use bus::{EventBus, NextEvent, Subscription};
pub use event::{
    Event, EventData, JOB_TAG_PREFIX, RawMessage, job_new_tag, job_ret_pattern, job_ret_tag,
};
pub use pattern::{TagPattern, escape, matches};
pub use transport::{LocalTransport, Transport};
