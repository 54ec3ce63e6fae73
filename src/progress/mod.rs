//! Run progress reported by the stage executor.
//!
//! - [`Progress`] one progress event (builder-style metadata)
//! - [`ProgressKind`] what happened

mod event;

pub use event::{Progress, ProgressKind};
