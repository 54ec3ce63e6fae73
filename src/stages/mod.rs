//! Stages and the collaborators that produce and start them.
//!
//! ## Contents
//! - [`Stage`], [`FanOutStage`], [`ResultStage`] one unit of the sequence
//! - [`StageSource`], [`StageQueue`] where stages come from (front to back, once)
//! - [`Dispatcher`] how a fan-out stage becomes a job
//!
//! ```text
//! StageSource ──next_stage()──► StageExecutor ──dispatch()──► Dispatcher ──► remote agents
//!                                     ▲                                          │
//!                                     └──────────── EventBus (job/<id>/ret/*) ◄──┘
//! ```

mod dispatcher;
mod source;
mod stage;

pub use dispatcher::Dispatcher;
pub use source::{StageQueue, StageSource};
pub use stage::{FanOutStage, ResultStage, Stage};
