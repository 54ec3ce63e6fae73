//! # Job state machine.
//!
//! A [`Job`] tracks one dispatched function against the set of targets
//! expected to answer:
//!
//! ```text
//! Dispatched ──(job/<id>/new or first return)──► AwaitingReturns
//!     │                                              │
//!     │                returned == expected ─────────┼──► Complete
//!     │                now > deadline ───────────────┼──► Partial   (missing targets timed out)
//!     └──────────── transport lost / cancelled ──────┴──► Failed
//! ```
//!
//! ## Invariants
//! - `returned ⊆ expected` and `results.keys() == returned`.
//! - The first return of a target wins; later ones are duplicates.
//! - A terminal job is frozen: returns that arrive afterwards go to
//!   [`Job::late_arrivals`] and never touch `results`.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::results::TargetResult;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an id.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrowed id.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier handed out by the dispatcher.
    JobId
);
string_id!(
    /// Identifier of one remote agent.
    TargetId
);

/// Where a job is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Dispatched, nothing heard yet.
    Dispatched,
    /// Started or partially returned.
    AwaitingReturns,
    /// Every expected target returned.
    Complete,
    /// Deadline elapsed with targets missing.
    Partial,
    /// Coordination failed (transport lost, run cancelled).
    Failed,
}

impl JobStatus {
    /// True for `Complete`, `Partial` and `Failed`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Partial | JobStatus::Failed
        )
    }
}

/// What a single return did to the job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    /// A `job/<id>/new` event was seen.
    Started,
    /// First return of an expected target; stored.
    Accepted(TargetId),
    /// Second or later return of a target; dropped.
    Duplicate(TargetId),
    /// Return of a target outside the expected set; dropped.
    Unexpected(TargetId),
    /// Return after the job became terminal; logged as late arrival.
    Late(TargetId),
    /// Event does not belong to this job.
    Unrelated,
}

/// A return that arrived after the job was frozen.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LateArrival {
    /// Target that answered late.
    pub target: TargetId,
    /// What it answered.
    pub result: TargetResult,
}

/// One in-flight dispatch.
#[derive(Clone, Debug)]
pub struct Job {
    id: JobId,
    expected: BTreeSet<TargetId>,
    returned: BTreeSet<TargetId>,
    results: BTreeMap<TargetId, TargetResult>,
    started_at: Instant,
    deadline: Option<Duration>,
    status: JobStatus,
    failure: Option<String>,
    late: Vec<LateArrival>,
}

impl Job {
    /// Registers a dispatched job.
    pub fn new(
        id: JobId,
        expected: impl IntoIterator<Item = TargetId>,
        deadline: Option<Duration>,
        now: Instant,
    ) -> Self {
        let mut job = Self {
            id,
            expected: expected.into_iter().collect(),
            returned: BTreeSet::new(),
            results: BTreeMap::new(),
            started_at: now,
            deadline,
            status: JobStatus::Dispatched,
            failure: None,
            late: Vec::new(),
        };
        if job.expected.is_empty() {
            job.status = JobStatus::Complete;
        }
        job
    }

    /// Job id.
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Targets expected to answer.
    pub fn expected(&self) -> &BTreeSet<TargetId> {
        &self.expected
    }

    /// Targets that answered (first return only).
    pub fn returned(&self) -> &BTreeSet<TargetId> {
        &self.returned
    }

    /// Stored returns keyed by target.
    pub fn results(&self) -> &BTreeMap<TargetId, TargetResult> {
        &self.results
    }

    /// Expected targets that have not answered.
    pub fn missing(&self) -> impl Iterator<Item = &TargetId> {
        self.expected.difference(&self.returned)
    }

    /// Returns received after the job was frozen.
    pub fn late_arrivals(&self) -> &[LateArrival] {
        &self.late
    }

    /// Why the job failed, if it did.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// When the job was registered.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Instant after which the job turns `Partial`, if it has a deadline.
    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline.map(|d| self.started_at + d)
    }

    /// Notes the `job/<id>/new` announcement.
    pub fn record_start(&mut self) -> Observation {
        if self.status == JobStatus::Dispatched {
            self.status = JobStatus::AwaitingReturns;
        }
        Observation::Started
    }

    /// Applies one return; the first return of a target wins.
    pub fn record_return(&mut self, target: TargetId, result: TargetResult) -> Observation {
        if self.status.is_terminal() {
            self.late.push(LateArrival {
                target: target.clone(),
                result,
            });
            return Observation::Late(target);
        }
        if !self.expected.contains(&target) {
            return Observation::Unexpected(target);
        }
        if !self.returned.insert(target.clone()) {
            return Observation::Duplicate(target);
        }

        self.results.insert(target.clone(), result);
        self.status = if self.returned.len() == self.expected.len() {
            JobStatus::Complete
        } else {
            JobStatus::AwaitingReturns
        };
        Observation::Accepted(target)
    }

    /// Turns the job `Partial` if `now` is past the deadline and it is not terminal yet.
    pub fn check_deadline(&mut self, now: Instant) -> JobStatus {
        if !self.status.is_terminal() {
            if let Some(at) = self.deadline_at() {
                if now > at {
                    self.status = JobStatus::Partial;
                }
            }
        }
        self.status
    }

    /// Freezes a non-terminal job as `Failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> JobStatus {
        if !self.status.is_terminal() {
            self.status = JobStatus::Failed;
            self.failure = Some(reason.into());
        }
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResourceOutcome;
    use crate::results::{Payload, Resource, ResourceId};

    fn targets(ids: &[&str]) -> Vec<TargetId> {
        ids.iter().map(|s| TargetId::from(*s)).collect()
    }

    fn result(comment: &str) -> TargetResult {
        TargetResult {
            payload: Payload {
                resources: vec![Resource {
                    id: ResourceId::parse("cmd_|-run_|-true_|-run").unwrap(),
                    outcome: ResourceOutcome::ok(comment),
                }],
                ..Payload::default()
            },
            ..TargetResult::default()
        }
    }

    #[test]
    fn completes_when_every_target_returned() {
        let now = Instant::now();
        let mut job = Job::new("42".into(), targets(&["w1", "w2"]), None, now);
        assert_eq!(job.status(), JobStatus::Dispatched);

        job.record_return("w1".into(), result("r1"));
        assert_eq!(job.status(), JobStatus::AwaitingReturns);
        job.record_return("w2".into(), result("r2"));
        assert_eq!(job.status(), JobStatus::Complete);
        assert_eq!(job.returned(), job.expected());
    }

    #[test]
    fn first_return_wins() {
        let mut job = Job::new("1".into(), targets(&["w1", "w2"]), None, Instant::now());
        assert_eq!(
            job.record_return("w1".into(), result("first")),
            Observation::Accepted("w1".into())
        );
        assert_eq!(
            job.record_return("w1".into(), result("second")),
            Observation::Duplicate("w1".into())
        );
        assert_eq!(job.returned().len(), 1);
        assert_eq!(job.results()["w1"], result("first"));
    }

    #[test]
    fn unexpected_targets_are_dropped() {
        let mut job = Job::new("1".into(), targets(&["w1"]), None, Instant::now());
        assert_eq!(
            job.record_return("intruder".into(), result("x")),
            Observation::Unexpected("intruder".into())
        );
        assert!(job.results().is_empty());
    }

    #[test]
    fn deadline_is_strict() {
        let start = Instant::now();
        let mut job = Job::new(
            "1".into(),
            targets(&["w1", "w2"]),
            Some(Duration::from_secs(5)),
            start,
        );
        job.record_return("w1".into(), result("r1"));

        assert_eq!(job.check_deadline(start + Duration::from_secs(5)), JobStatus::AwaitingReturns);
        assert_eq!(
            job.check_deadline(start + Duration::from_secs(6)),
            JobStatus::Partial
        );
        assert_eq!(job.missing().collect::<Vec<_>>(), vec![&TargetId::from("w2")]);
    }

    #[test]
    fn frozen_job_logs_late_arrivals() {
        let start = Instant::now();
        let mut job = Job::new("1".into(), targets(&["w1"]), Some(Duration::ZERO), start);
        job.check_deadline(start + Duration::from_millis(1));
        assert_eq!(
            job.record_return("w1".into(), result("late")),
            Observation::Late("w1".into())
        );
        assert!(job.results().is_empty());
        assert_eq!(job.late_arrivals().len(), 1);
    }

    #[test]
    fn start_and_fail() {
        let mut job = Job::new("1".into(), targets(&["w1"]), None, Instant::now());
        job.record_start();
        assert_eq!(job.status(), JobStatus::AwaitingReturns);
        assert_eq!(job.fail("transport lost"), JobStatus::Failed);
        assert_eq!(job.failure(), Some("transport lost"));
        // terminal states are sticky
        job.record_return("w1".into(), result("x"));
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn empty_expected_set_is_trivially_complete() {
        let job = Job::new("1".into(), Vec::new(), None, Instant::now());
        assert_eq!(job.status(), JobStatus::Complete);
    }
}
