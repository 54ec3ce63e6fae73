//! # stagevisor
//!
//! **Stagevisor** is the master-side coordination layer of a fleet
//! orchestration setup: it fans stages out to remote agents, listens to a
//! shared event bus, correlates each agent's return with the job it belongs
//! to, and decides when a stage (and the whole run) is done.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   StageSource (ordered, lazy, read once)
//!        │ next_stage()
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  StageExecutor (one stage at a time)                              │
//! │  - validates the sequence up front (ConfigurationError)           │
//! │  - ResultStage  → classify resources / metadata                   │
//! │  - FanOutStage  → Dispatcher::dispatch → JobCorrelator            │
//! │  - FailurePolicy after every stage that did not complete          │
//! │  - RunReport (append-only) → FinalReport                          │
//! └──────┬───────────────────────────────┬────────────────────┬───────┘
//!        │ dispatch(targets, fn, args)   │ subscribe          │ emit(Progress)
//!        ▼                               │ job/<id>/new       ▼
//!   Dispatcher ──► remote agents         │ job/<id>/ret/*   ObserverSet
//!                        │               ▼                    ├─► LogWriter
//!                        │        ┌─────────────────┐         └─► custom
//!                        └──────► │    EventBus     │
//!               publish returns   │ (pattern table) │ ◄── Transport (receive / publish / connect)
//!                                 └─────────────────┘
//! ```
//!
//! ### Job lifecycle
//! ```text
//! Dispatched ──► AwaitingReturns ──┬─ returned == expected ──► Complete
//!                                  ├─ now > deadline ────────► Partial  (missing targets: TimedOut)
//!                                  └─ bus lost / cancelled ──► Failed   (missing targets: Abandoned)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Event bus**     | Tag-addressed publish/subscribe over a pluggable transport.  | [`EventBus`], [`Transport`], [`matches`]   |
//! | **Correlation**   | Reduce a job's expected responders to complete or partial.   | [`JobCorrelator`], [`Job`]                 |
//! | **Orchestration** | Run stages in order, apply the failure policy.               | [`StageExecutor`], [`Dispatcher`]          |
//! | **Reporting**     | Per-stage, per-target outcomes and an overall verdict.       | [`RunReport`], [`FinalReport`]             |
//! | **Observers**     | Hook into run progress (logging, metrics, UIs).              | [`Observe`], [`LogWriter`]                 |
//! | **Tail**          | Print bus events matching a glob.                            | [`tail`], [`TailOptions`]                  |
//! | **Errors**        | Typed errors for transport, dispatch and configuration.      | [`TransportError`], [`ConfigurationError`] |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//! use stagevisor::{
//!     BusConfig, DispatchError, Dispatcher, EventBus, EventData, FanOutStage, JobId,
//!     LocalTransport, Overall, RunConfig, RunOptions, Stage, StageExecutor, StageQueue, TargetId,
//! };
//!
//! /// Every target answers right away with one successful resource.
//! struct Echo(EventBus);
//!
//! #[async_trait]
//! impl Dispatcher for Echo {
//!     async fn dispatch(&self, targets: &[TargetId], _f: &str, _a: &EventData) -> Result<JobId, DispatchError> {
//!         let (bus, targets) = (self.0.clone(), targets.to_vec());
//!         tokio::spawn(async move {
//!             tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!             for t in targets {
//!                 let ret = json!({"return": {"cmd_|-hello_|-echo hi_|-run": {"result": true}}});
//!                 let data = ret.as_object().cloned().unwrap_or_default();
//!                 let _ = bus.publish(&format!("job/1/ret/{t}"), data).await;
//!             }
//!         });
//!         Ok(JobId::from("1"))
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::connect(Arc::new(LocalTransport::new()), BusConfig::default()).await?;
//!     let exec = StageExecutor::new(bus.clone(), Arc::new(Echo(bus)), RunConfig::default());
//!
//!     let stages = StageQueue::from(vec![Stage::FanOut(FanOutStage::new(
//!         "hello",
//!         ["web-1", "web-2"],
//!         "state.sls",
//!     ))]);
//!     let report = exec.run(stages, &RunOptions::default(), &CancellationToken::new()).await?;
//!
//!     assert_eq!(report.overall, Overall::Success);
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod jobs;
mod observers;
mod policies;
mod progress;
mod report;
mod results;
mod stages;
mod tail;

// ---- Public re-exports ----

pub use core::{BusConfig, RunConfig, RunOptions, StageExecutor, wait_for_shutdown_signal};
pub use error::{ConfigurationError, DispatchError, PatternError, TailError, TransportError};
pub use events::{
    Event, EventBus, EventData, JOB_TAG_PREFIX, LocalTransport, NextEvent, RawMessage, Subscription,
    TagPattern, Transport, escape, job_new_tag, job_ret_pattern, job_ret_tag, matches,
};
pub use jobs::{Job, JobCorrelator, JobId, JobStatus, LateArrival, Observation, TargetId};
pub use observers::{LogWriter, Observe, ObserverSet};
pub use policies::{BackoffPolicy, FailurePolicy, JitterPolicy, ReconnectPolicy};
pub use progress::{Progress, ProgressKind};
pub use report::{
    FinalReport, Overall, RunReport, StageOutcome, StageRecord, TargetReport, TargetStatus,
};
pub use results::{Payload, RESOURCE_DELIMITER, Resource, ResourceId, ResourceOutcome, TargetResult};
pub use stages::{Dispatcher, FanOutStage, ResultStage, Stage, StageQueue, StageSource};
pub use tail::{TailOptions, tail};
