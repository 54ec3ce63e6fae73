//! Result payloads: resources, metadata and per-target returns.
//!
//! ## Contents
//! - [`ResourceId`], [`ResourceOutcome`] one remote-applied resource
//! - [`Payload`], [`Resource`] a mapping split into resources and metadata
//! - [`TargetResult`] one target's parsed return event

mod payload;
mod resource;
mod target;

pub use payload::{Payload, Resource};
pub use resource::{RESOURCE_DELIMITER, ResourceId, ResourceOutcome};
pub use target::TargetResult;
