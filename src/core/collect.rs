//! # Run a single stage.
//!
//! Executes one stage and turns it into a [`StageRecord`]. Never fails: every
//! problem (dispatch refused, transport lost, deadline, cancellation) ends up in
//! the record, and the executor applies the failure policy to it.
//!
//! ## Flow
//!
//! ```text
//! ResultStage:
//!   classify once → emit MetadataReported / ResourceFailed → record (Failed if any resource failed)
//!
//! FanOutStage:
//!   dispatch(targets, function, args)
//!     ├─ Err(DispatchError) → record Failed (no subscription was created)
//!     └─ Ok(job_id) → JobCorrelator::start (subscribe job/<id>/new + job/<id>/ret/*)
//!                    loop {
//!                      next_event(wait ≤ poll_interval, cancel)
//!                        Event     → ingest → emit TargetReturned / ResourceFailed
//!                        Timeout   → (nothing)
//!                        Cancelled → job Failed("cancelled")
//!                        Err       → job Failed(transport message)
//!                      poll(now)   → Partial once now > deadline
//!                    } until terminal
//!                    → record from the job (missing targets TimedOut or Abandoned)
//! ```
//!
//! ## Rules
//! - Exactly one record per executed stage.
//! - The dispatch call is raced against cancellation; a cancelled dispatch is a failed stage.
//! - The subscriptions live exactly as long as the stage.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::RunConfig;
use crate::events::{EventBus, NextEvent};
use crate::jobs::{JobCorrelator, Observation, TargetId};
use crate::observers::ObserverSet;
use crate::progress::{Progress, ProgressKind};
use crate::report::StageRecord;
use crate::stages::{Dispatcher, FanOutStage, ResultStage};

/// Reason recorded for a stage interrupted by a stop request.
pub(crate) const CANCELLED: &str = "cancelled";

/// Everything one stage needs from its executor.
pub(super) struct StageCtx<'a> {
    pub bus: &'a EventBus,
    pub dispatcher: &'a dyn Dispatcher,
    pub cfg: &'a RunConfig,
    pub observers: &'a ObserverSet,
    pub cancel: &'a CancellationToken,
}

/// Reports a collected result payload.
pub(super) fn collect_results(ctx: &StageCtx<'_>, index: usize, stage: &ResultStage) -> StageRecord {
    let name = stage.name.as_deref();
    for (key, value) in &stage.payload.metadata {
        ctx.observers.emit(
            Progress::new(ProgressKind::MetadataReported)
                .with_stage(index, name)
                .with_detail(format!("{key}={value}")),
        );
    }
    for resource in stage.payload.failed_resources() {
        ctx.observers.emit(
            Progress::new(ProgressKind::ResourceFailed)
                .with_stage(index, name)
                .with_detail(resource.id.as_str())
                .with_reason(resource.outcome.comment.as_str())
                .with_succeeded(false),
        );
    }
    StageRecord::from_results(index, stage)
}

/// Dispatches `stage` and waits for its job to reach a terminal status.
pub(super) async fn run_fan_out(ctx: &StageCtx<'_>, index: usize, stage: &FanOutStage) -> StageRecord {
    let dispatched = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            return StageRecord::dispatch_failed(index, stage, CANCELLED);
        }
        res = ctx.dispatcher.dispatch(&stage.targets, &stage.function, &stage.args) => res,
    };

    let job_id = match dispatched {
        Ok(id) => id,
        Err(e) => {
            warn!(
                stage = index,
                stage_id = %stage.id,
                dispatcher = ctx.dispatcher.name(),
                error = %e,
                label = e.as_label(),
                "dispatch failed"
            );
            return StageRecord::dispatch_failed(index, stage, e.as_message());
        }
    };

    let expected = stage.expected_targets();
    ctx.observers.emit(
        Progress::new(ProgressKind::JobDispatched)
            .with_stage(index, Some(stage.id.as_str()))
            .with_job(job_id.as_str())
            .with_count(expected.len()),
    );

    let mut corr = match JobCorrelator::start(ctx.bus, job_id, expected, ctx.cfg.job_deadline()) {
        Ok(c) => c,
        Err(e) => {
            warn!(stage = index, error = %e, "cannot subscribe to job returns");
            return StageRecord::dispatch_failed(index, stage, e.to_string());
        }
    };

    let poll = ctx.cfg.poll_interval_clamped();
    while !corr.status().is_terminal() {
        let wait = corr.wait_budget(poll, Instant::now());
        let next = ctx.bus.next_event(corr.subscriptions(), wait, ctx.cancel).await;
        match next {
            Ok(NextEvent::Event(ev)) => {
                if let Observation::Accepted(target) = corr.ingest(&ev) {
                    report_return(ctx, index, &corr, &target);
                }
            }
            Ok(NextEvent::Timeout) => {}
            Ok(NextEvent::Cancelled) => {
                debug!(stage = index, job_id = %corr.job().id(), "stop requested while waiting");
                corr.fail(CANCELLED);
            }
            Ok(NextEvent::Exhausted) => {
                corr.fail("job subscriptions closed");
            }
            Err(e) => {
                warn!(stage = index, job_id = %corr.job().id(), error = %e, "lost the event bus");
                corr.fail(e.as_message());
            }
        }
        corr.poll(Instant::now());
    }

    StageRecord::from_job(index, stage, corr.job())
}

fn report_return(
    ctx: &StageCtx<'_>,
    index: usize,
    corr: &JobCorrelator,
    target: &TargetId,
) {
    let job = corr.job();
    let Some(result) = job.results().get(target) else {
        return;
    };

    ctx.observers.emit(
        Progress::new(ProgressKind::TargetReturned)
            .with_stage(index, None)
            .with_job(job.id().as_str())
            .with_target(target.as_str())
            .with_succeeded(result.succeeded()),
    );
    for resource in result.payload.failed_resources() {
        ctx.observers.emit(
            Progress::new(ProgressKind::ResourceFailed)
                .with_stage(index, None)
                .with_target(target.as_str())
                .with_detail(resource.id.as_str())
                .with_reason(resource.outcome.comment.as_str())
                .with_succeeded(false),
        );
    }
}
