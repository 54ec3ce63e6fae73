//! # Progress observers.
//!
//! ```text
//! StageExecutor ── emit(Progress) ──► ObserverSet ──► [queue] ─► Observe::on_progress(&Progress)
//!                                                        │
//!                                          ┌─────────────┼───────────┐
//!                                          ▼             ▼           ▼
//!                                      LogWriter      custom       ...
//! ```
//!
//! Implement [`Observe`] for metrics, audit trails or operator UIs; pass the
//! observers to [`StageExecutor::with_observers`](crate::StageExecutor::with_observers).

mod log;
mod observe;
mod set;

pub use log::LogWriter;
pub use observe::Observe;
pub use set::ObserverSet;
