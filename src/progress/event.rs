//! # Run progress events.
//!
//! The stage executor reports what it is doing as [`Progress`] events. They
//! are separate from bus [`Event`](crate::Event)s: bus events come from remote
//! agents, progress events describe the run itself and go to observers only.
//!
//! ## Ordering guarantees
//! Each progress event has a globally unique sequence number (`seq`) that
//! increases monotonically, so observers can restore emission order.
//!
//! ## Example
//! ```rust
//! use stagevisor::{Progress, ProgressKind};
//!
//! let p = Progress::new(ProgressKind::JobDispatched)
//!     .with_stage(2, Some("webservers"))
//!     .with_job("20231001120000123456")
//!     .with_count(12);
//!
//! assert_eq!(p.kind, ProgressKind::JobDispatched);
//! assert_eq!(p.stage, Some(2));
//! assert_eq!(p.job.as_deref(), Some("20231001120000123456"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

/// Global sequence counter for progress ordering.
static PROGRESS_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    // === Run ===
    /// The run passed validation and is about to execute its first stage.
    ///
    /// Sets: `count` (number of stages after exclusion)
    RunStarted,

    /// The run is over.
    ///
    /// Sets: `detail` (overall verdict), `count` (stages recorded)
    RunFinished,

    // === Stage ===
    /// A stage is starting.
    ///
    /// Sets: `stage`, `stage_id`, `detail` (stage kind)
    StageStarted,

    /// A fan-out stage was excluded by the run options.
    ///
    /// Sets: `stage`, `stage_id`
    StageSkipped,

    /// A stage reached its outcome.
    ///
    /// Sets: `stage`, `stage_id`, `detail` (outcome), `reason` (if not complete)
    StageFinished,

    // === Job ===
    /// A fan-out stage was dispatched.
    ///
    /// Sets: `stage`, `job`, `count` (expected targets)
    JobDispatched,

    /// A target returned.
    ///
    /// Sets: `stage`, `job`, `target`, `succeeded`
    TargetReturned,

    // === Results ===
    /// A resource reported a failure.
    ///
    /// Sets: `stage`, `target` (fan-out stages), `detail` (resource id), `reason` (comment)
    ResourceFailed,

    /// A result stage carried a metadata entry.
    ///
    /// Sets: `stage`, `detail` (`key=value`)
    MetadataReported,
}

/// One progress event with optional metadata.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: ProgressKind,

    /// Stage index.
    pub stage: Option<usize>,
    /// Stage id.
    pub stage_id: Option<Arc<str>>,
    /// Job id.
    pub job: Option<Arc<str>>,
    /// Target id.
    pub target: Option<Arc<str>>,
    /// Kind-specific detail (outcome, resource id, metadata entry).
    pub detail: Option<Arc<str>>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Kind-specific count.
    pub count: Option<usize>,
    /// Target or resource success flag.
    pub succeeded: Option<bool>,
}

impl Progress {
    /// Creates a new progress event with the current timestamp and next sequence number.
    pub fn new(kind: ProgressKind) -> Self {
        Self {
            seq: PROGRESS_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            stage: None,
            stage_id: None,
            job: None,
            target: None,
            detail: None,
            reason: None,
            count: None,
            succeeded: None,
        }
    }

    /// Attaches the stage index and id.
    #[inline]
    pub fn with_stage(mut self, index: usize, id: Option<&str>) -> Self {
        self.stage = Some(index);
        self.stage_id = id.map(Arc::from);
        self
    }

    /// Attaches a job id.
    #[inline]
    pub fn with_job(mut self, job: impl Into<Arc<str>>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Attaches a target id.
    #[inline]
    pub fn with_target(mut self, target: impl Into<Arc<str>>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attaches a kind-specific detail.
    #[inline]
    pub fn with_detail(mut self, detail: impl Into<Arc<str>>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches a reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a count.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches a success flag.
    #[inline]
    pub fn with_succeeded(mut self, ok: bool) -> Self {
        self.succeeded = Some(ok);
        self
    }

    /// True for events that report something going wrong.
    #[inline]
    pub fn is_failure(&self) -> bool {
        match self.kind {
            ProgressKind::ResourceFailed => true,
            ProgressKind::TargetReturned => self.succeeded == Some(false),
            ProgressKind::StageFinished => self.reason.is_some(),
            _ => false,
        }
    }
}
