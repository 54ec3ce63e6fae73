//! # Run report.
//!
//! [`RunReport`] is owned by the stage executor and only ever appended to.
//! [`RunReport::finalize`] turns it into a [`FinalReport`]:
//!
//! ```text
//! overall = Aborted          the failure policy stopped the run (or it was cancelled)
//!         = Success          every stage Complete and nothing reported a failure
//!         = PartialFailure   otherwise
//! ```
//!
//! Serialized form (`serde_json`):
//! ```text
//! {"stages": [{"index": 0, "outcome": "Complete", "targets": {"w1": {"status": "Returned", "succeeded": true, "resources": [...]}}}],
//!  "overall": "Success"}
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use crate::events::EventData;
use crate::jobs::{Job, JobId, JobStatus, LateArrival, TargetId};
use crate::results::Resource;
use crate::stages::{FanOutStage, ResultStage};

/// How a stage ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StageOutcome {
    /// Every expected target returned (or the collected results were clean).
    Complete,
    /// The deadline elapsed with targets missing.
    Partial,
    /// Dispatch or coordination failed, or collected results carry failures.
    Failed,
}

/// What became of one target within a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TargetStatus {
    /// The target returned in time.
    Returned,
    /// The target never returned before the deadline.
    TimedOut,
    /// Waiting was abandoned (transport lost or run cancelled).
    Abandoned,
}

/// One target's entry in a stage record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TargetReport {
    /// Whether and how the target answered.
    pub status: TargetStatus,
    /// False if the target did not return or reported a failure.
    pub succeeded: bool,
    /// Resource outcomes of the return.
    pub resources: Vec<Resource>,
    /// Non-resource data of the return.
    #[serde(skip_serializing_if = "EventData::is_empty")]
    pub metadata: EventData,
}

impl TargetReport {
    fn missing(status: TargetStatus) -> Self {
        Self {
            status,
            succeeded: false,
            resources: Vec::new(),
            metadata: EventData::new(),
        }
    }
}

/// One stage in the report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageRecord {
    /// Position in the stage sequence.
    pub index: usize,
    /// `fan_out` or `results`.
    pub kind: &'static str,
    /// Stage id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Dispatched function (fan-out stages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Job id (fan-out stages that were dispatched).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// How the stage ended.
    pub outcome: StageOutcome,
    /// Per-target entries (fan-out stages).
    pub targets: BTreeMap<TargetId, TargetReport>,
    /// Collected resource outcomes (result stages).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
    /// Stage-level metadata (result stages).
    #[serde(skip_serializing_if = "EventData::is_empty")]
    pub metadata: EventData,
    /// Why the stage did not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Returns that arrived after the stage was finalized.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub late: Vec<LateArrival>,
}

impl StageRecord {
    /// Record for a fan-out stage whose job reached a terminal status.
    pub fn from_job(index: usize, stage: &FanOutStage, job: &Job) -> Self {
        let outcome = match job.status() {
            JobStatus::Complete => StageOutcome::Complete,
            JobStatus::Partial => StageOutcome::Partial,
            _ => StageOutcome::Failed,
        };
        let missing_as = match job.status() {
            JobStatus::Partial => TargetStatus::TimedOut,
            _ => TargetStatus::Abandoned,
        };

        let mut targets: BTreeMap<TargetId, TargetReport> = job
            .results()
            .iter()
            .map(|(target, result)| {
                let report = TargetReport {
                    status: TargetStatus::Returned,
                    succeeded: result.succeeded(),
                    resources: result.payload.resources.clone(),
                    metadata: result.payload.metadata.clone(),
                };
                (target.clone(), report)
            })
            .collect();
        for target in job.missing() {
            targets.insert(target.clone(), TargetReport::missing(missing_as));
        }

        let reason = match job.status() {
            JobStatus::Partial => {
                let n = targets
                    .values()
                    .filter(|t| t.status == TargetStatus::TimedOut)
                    .count();
                Some(format!("{n} target(s) timed out"))
            }
            _ => job.failure().map(str::to_string),
        };

        Self {
            index,
            kind: "fan_out",
            id: Some(stage.id.clone()),
            function: Some(stage.function.clone()),
            job_id: Some(job.id().clone()),
            outcome,
            targets,
            resources: Vec::new(),
            metadata: EventData::new(),
            reason,
            late: job.late_arrivals().to_vec(),
        }
    }

    /// Record for a fan-out stage that never got a job.
    pub fn dispatch_failed(index: usize, stage: &FanOutStage, reason: impl Into<String>) -> Self {
        Self {
            index,
            kind: "fan_out",
            id: Some(stage.id.clone()),
            function: Some(stage.function.clone()),
            job_id: None,
            outcome: StageOutcome::Failed,
            targets: BTreeMap::new(),
            resources: Vec::new(),
            metadata: EventData::new(),
            reason: Some(reason.into()),
            late: Vec::new(),
        }
    }

    /// Record for a collected result stage; failed resources make it `Failed`.
    pub fn from_results(index: usize, stage: &ResultStage) -> Self {
        let failed = stage.payload.failed_resources().count();
        let (outcome, reason) = if failed > 0 {
            (
                StageOutcome::Failed,
                Some(format!("{failed} resource(s) failed")),
            )
        } else {
            (StageOutcome::Complete, None)
        };

        Self {
            index,
            kind: "results",
            id: stage.name.clone(),
            function: None,
            job_id: None,
            outcome,
            targets: BTreeMap::new(),
            resources: stage.payload.resources.clone(),
            metadata: stage.payload.metadata.clone(),
            reason,
            late: Vec::new(),
        }
    }

    /// True if anything in this stage went wrong.
    pub fn has_failures(&self) -> bool {
        self.outcome != StageOutcome::Complete
            || self.targets.values().any(|t| !t.succeeded)
            || self.resources.iter().any(|r| !r.outcome.succeeded)
    }

    /// Targets recorded with the given status.
    pub fn targets_with(&self, status: TargetStatus) -> impl Iterator<Item = &TargetId> {
        self.targets
            .iter()
            .filter(move |(_, t)| t.status == status)
            .map(|(id, _)| id)
    }
}

/// Run-level verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Overall {
    /// Every stage completed cleanly.
    Success,
    /// The run went to the end but something failed on the way.
    PartialFailure,
    /// Execution stopped early.
    Aborted,
}

/// Append-only record of a run in progress.
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    stages: Vec<StageRecord>,
    aborted: Option<String>,
}

impl RunReport {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage record.
    pub fn push(&mut self, record: StageRecord) {
        self.stages.push(record);
    }

    /// Marks the run as stopped early.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.aborted.get_or_insert_with(|| reason.into());
    }

    /// Records so far.
    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// True once the run was stopped early.
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Freezes the report and computes the overall verdict.
    pub fn finalize(self) -> FinalReport {
        let overall = if self.aborted.is_some() {
            Overall::Aborted
        } else if self.stages.iter().any(StageRecord::has_failures) {
            Overall::PartialFailure
        } else {
            Overall::Success
        };
        FinalReport {
            stages: self.stages,
            overall,
            aborted_by: self.aborted,
        }
    }
}

/// Immutable result of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FinalReport {
    /// Stages in execution order, up to where the run stopped.
    pub stages: Vec<StageRecord>,
    /// Run-level verdict.
    pub overall: Overall,
    /// Why the run stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted_by: Option<String>,
}

impl FinalReport {
    /// JSON rendering for external consumers.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Record of stage `index`, if the run got that far.
    pub fn stage(&self, index: usize) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.index == index)
    }
}
