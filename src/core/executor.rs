//! # StageExecutor: drives an ordered stage sequence.
//!
//! The executor owns the run: it drains and validates the [`StageSource`],
//! executes stages strictly one after another, appends one [`StageRecord`] per
//! executed stage to the [`RunReport`], and applies the [`FailurePolicy`]
//! after every stage that did not complete.
//!
//! ## Architecture
//! ```text
//! StageSource ──drain + validate──► plan (ConfigurationError? → Err, nothing dispatched)
//!                                      │
//!                                      ▼
//!   for (index, stage) in plan:
//!     cancelled?                 → abort
//!     excluded fan-out?          → StageSkipped, no record
//!     ResultStage                → collect_results
//!     FanOutStage                → run_fan_out (dispatch → correlate → terminal)
//!     record → RunReport
//!     cancelled during stage?    → abort
//!     outcome != Complete && Abort policy → abort
//!                                      │
//!                                      ▼
//!                          RunReport::finalize() → FinalReport
//! ```
//!
//! ## Rules
//! - Stage *n+1* is dispatched only after stage *n* reached a terminal status.
//! - A failed resource never stops the run by itself; a `ResultStage` with
//!   failed resources is `Failed` and goes through the policy like any other stage.
//! - A stopped run still returns the report of everything executed so far.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collect::{CANCELLED, StageCtx, collect_results, run_fan_out};
use super::config::{RunConfig, RunOptions};
use super::shutdown::wait_for_shutdown_signal;
use crate::error::ConfigurationError;
use crate::events::EventBus;
use crate::observers::{Observe, ObserverSet};
use crate::policies::FailurePolicy;
use crate::progress::{Progress, ProgressKind};
use crate::report::{FinalReport, RunReport, StageOutcome, StageRecord};
use crate::stages::{Dispatcher, Stage, StageSource};

/// Runs stage sequences against a bus and a dispatcher.
pub struct StageExecutor {
    bus: EventBus,
    dispatcher: Arc<dyn Dispatcher>,
    cfg: RunConfig,
    observers: Vec<Arc<dyn Observe>>,
}

impl StageExecutor {
    /// Creates an executor without progress observers.
    pub fn new(bus: EventBus, dispatcher: Arc<dyn Dispatcher>, cfg: RunConfig) -> Self {
        Self {
            bus,
            dispatcher,
            cfg,
            observers: Vec::new(),
        }
    }

    /// Adds progress observers (one bounded queue and worker each, per run).
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers.extend(observers);
        self
    }

    /// Executor configuration.
    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    /// Drains and validates `source` and returns the stages a run would
    /// execute, without dispatching anything.
    ///
    /// Excluded fan-out stages are left out; the others carry the arguments
    /// they would be dispatched with.
    pub fn show_stages<S: StageSource>(
        source: S,
        opts: &RunOptions,
    ) -> Result<Vec<Stage>, ConfigurationError> {
        Ok(plan(source, opts)?
            .into_iter()
            .filter_map(|planned| match planned {
                Planned::Run(_, stage) => Some(stage),
                Planned::Skip(..) => None,
            })
            .collect())
    }

    /// Executes every stage of `source` in order.
    ///
    /// Returns `Err` only for a malformed sequence or options, before
    /// anything was dispatched. Every other problem is recorded in the report.
    /// When `cancel` fires, the current wait returns within one poll interval
    /// and the run is finalized as aborted.
    pub async fn run<S: StageSource>(
        &self,
        source: S,
        opts: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<FinalReport, ConfigurationError> {
        let planned = plan(source, opts)?;
        let observers = ObserverSet::new(self.observers.clone(), self.cfg.observer_queue_clamped());

        let to_run = planned
            .iter()
            .filter(|p| matches!(p, Planned::Run(..)))
            .count();
        info!(
            stages = to_run,
            excluded = planned.len() - to_run,
            policy = self.cfg.failure_policy.as_label(),
            "run started"
        );
        observers.emit(Progress::new(ProgressKind::RunStarted).with_count(to_run));

        let ctx = StageCtx {
            bus: &self.bus,
            dispatcher: self.dispatcher.as_ref(),
            cfg: &self.cfg,
            observers: &observers,
            cancel,
        };
        let report = self.execute(&ctx, planned).await;

        let fin = report.finalize();
        info!(overall = ?fin.overall, stages = fin.stages.len(), "run finished");
        observers.emit(
            Progress::new(ProgressKind::RunFinished)
                .with_detail(format!("{:?}", fin.overall))
                .with_count(fin.stages.len()),
        );
        observers.shutdown().await;
        Ok(fin)
    }

    /// Like [`run`](Self::run), cancelled by SIGINT/SIGTERM/SIGQUIT (Ctrl-C on Windows).
    pub async fn run_until_signal<S: StageSource>(
        &self,
        source: S,
        opts: &RunOptions,
    ) -> Result<FinalReport, ConfigurationError> {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let listener = tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(()) => {
                    warn!("stop requested by signal");
                    trigger.cancel();
                }
                Err(e) => warn!(error = %e, "cannot listen for shutdown signals"),
            }
        });

        let res = self.run(source, opts, &cancel).await;
        listener.abort();
        res
    }

    async fn execute(&self, ctx: &StageCtx<'_>, planned: Vec<Planned>) -> RunReport {
        let mut report = RunReport::new();

        for planned in planned {
            if ctx.cancel.is_cancelled() {
                report.abort(CANCELLED);
                break;
            }

            let (index, stage) = match planned {
                Planned::Skip(index, id) => {
                    debug!(stage = index, stage_id = %id, "stage excluded");
                    ctx.observers.emit(
                        Progress::new(ProgressKind::StageSkipped).with_stage(index, Some(id.as_str())),
                    );
                    continue;
                }
                Planned::Run(index, stage) => (index, stage),
            };

            ctx.observers.emit(
                Progress::new(ProgressKind::StageStarted)
                    .with_stage(index, stage.id())
                    .with_detail(stage.kind()),
            );
            let record = match &stage {
                Stage::Results(rs) => collect_results(ctx, index, rs),
                Stage::FanOut(fs) => run_fan_out(ctx, index, fs).await,
            };
            let outcome = record.outcome;
            self.finished(ctx, &record);
            report.push(record);

            if ctx.cancel.is_cancelled() {
                report.abort(CANCELLED);
                break;
            }
            if outcome != StageOutcome::Complete {
                match self.cfg.failure_policy {
                    FailurePolicy::Abort => {
                        warn!(stage = index, ?outcome, "stopping run: failure policy is abort");
                        report.abort(format!("stage {index} ended {outcome:?}"));
                        break;
                    }
                    FailurePolicy::Continue => {
                        info!(stage = index, ?outcome, "continuing after incomplete stage");
                    }
                }
            }
        }

        report
    }

    fn finished(&self, ctx: &StageCtx<'_>, record: &StageRecord) {
        let mut p = Progress::new(ProgressKind::StageFinished)
            .with_stage(record.index, record.id.as_deref())
            .with_detail(format!("{:?}", record.outcome));
        if let Some(reason) = &record.reason {
            p = p.with_reason(reason.as_str());
        }
        if let Some(job) = &record.job_id {
            p = p.with_job(job.as_str());
        }
        ctx.observers.emit(p);
    }
}

/// A validated stage with its position in the original sequence.
enum Planned {
    Run(usize, Stage),
    Skip(usize, String),
}

/// Drains `source`, validates every stage and resolves dispatch arguments.
fn plan<S: StageSource>(mut source: S, opts: &RunOptions) -> Result<Vec<Planned>, ConfigurationError> {
    opts.pillar_overrides()?;
    let excluded = opts.exclude_patterns()?;

    let mut planned = Vec::new();
    let mut index = 0;
    while let Some(stage) = source.next_stage()? {
        stage.validate(index)?;
        planned.push(match stage {
            Stage::FanOut(fs) if excluded.iter().any(|p| p.is_match(&fs.id)) => {
                Planned::Skip(index, fs.id)
            }
            Stage::FanOut(mut fs) => {
                fs.args = opts.apply(&fs)?;
                Planned::Run(index, Stage::FanOut(fs))
            }
            other => Planned::Run(index, other),
        });
        index += 1;
    }
    Ok(planned)
}
