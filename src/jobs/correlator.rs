//! # JobCorrelator: reduces a job's expected-responder set.
//!
//! The correlator owns a [`Job`] and the bus subscriptions that feed it:
//! `job/<id>/new` and `job/<id>/ret/*`. The stage executor drives it:
//!
//! ```text
//! start(bus, job_id, expected, deadline)      subscribe first, then wait
//! loop {
//!   bus.next_event(correlator.subscriptions(), correlator.wait_budget(..))
//!     ├─ Event   ─► observe(event)   target = last tag segment, first return wins
//!     └─ Timeout ─► (nothing)
//!   poll(now)                         now > deadline ─► queued returns received in time are applied,
//!                                                       then Partial; the rest become late arrivals
//! } until status is terminal
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::job::{Job, JobId, JobStatus, Observation, TargetId};
use crate::error::PatternError;
use crate::events::{Event, EventBus, JOB_TAG_PREFIX, Subscription, escape};
use crate::results::TargetResult;

/// Extra wait past the deadline so that `now > deadline` holds when the wait returns.
const DEADLINE_SLACK: Duration = Duration::from_millis(1);

/// Tracks one job against the events of the bus.
pub struct JobCorrelator {
    job: Job,
    ret_prefix: String,
    subs: Vec<Subscription>,
}

impl JobCorrelator {
    /// Registers `expected` for `job_id` and subscribes to the job's tags.
    pub fn start(
        bus: &EventBus,
        job_id: JobId,
        expected: impl IntoIterator<Item = TargetId>,
        deadline: Option<Duration>,
    ) -> Result<Self, PatternError> {
        let escaped = escape(job_id.as_str());
        let subs = vec![
            bus.subscribe(&format!("{JOB_TAG_PREFIX}/{escaped}/new"))?,
            bus.subscribe(&format!("{JOB_TAG_PREFIX}/{escaped}/ret/*"))?,
        ];

        let ret_prefix = format!("{JOB_TAG_PREFIX}/{job_id}/ret/");
        let job = Job::new(job_id, expected, deadline, Instant::now());
        debug!(
            job_id = %job.id(),
            expected = job.expected().len(),
            ?deadline,
            "correlating job"
        );

        Ok(Self {
            job,
            ret_prefix,
            subs,
        })
    }

    /// The tracked job.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.job.status()
    }

    /// Subscriptions to wait on with [`EventBus::next_event`].
    pub fn subscriptions(&mut self) -> &mut [Subscription] {
        &mut self.subs
    }

    /// How long the next wait may block: `poll`, shortened so the deadline is not overslept.
    pub fn wait_budget(&self, poll: Duration, now: Instant) -> Duration {
        match self.job.deadline_at() {
            Some(at) => poll.min(at.saturating_duration_since(now) + DEADLINE_SLACK),
            None => poll,
        }
    }

    /// Applies one event and returns the resulting status.
    pub fn observe(&mut self, event: &Event) -> JobStatus {
        self.ingest(event);
        self.status()
    }

    /// Applies one event and reports what it did.
    pub fn ingest(&mut self, event: &Event) -> Observation {
        if event.is_job_new(self.job.id().as_str()) {
            debug!(job_id = %self.job.id(), minions = ?event.data().get("minions"), "job started");
            self.check_announced_minions(event);
            return self.job.record_start();
        }

        let Some(target) = event.tag().strip_prefix(&self.ret_prefix) else {
            return Observation::Unrelated;
        };
        if target.is_empty() || target.contains('/') {
            return Observation::Unrelated;
        }

        if self.job.deadline_at().is_some_and(|at| event.received > at) {
            self.expire(event.received);
        }
        let result = TargetResult::from_return(event.data());
        let observation = self.job.record_return(TargetId::from(target), result);
        match &observation {
            Observation::Accepted(t) => {
                debug!(
                    job_id = %self.job.id(),
                    target = %t,
                    remaining = self.job.expected().len() - self.job.returned().len(),
                    "return received"
                );
                if self.job.status() == JobStatus::Complete {
                    info!(job_id = %self.job.id(), targets = self.job.returned().len(), "job complete");
                }
            }
            Observation::Duplicate(t) => {
                debug!(job_id = %self.job.id(), target = %t, "duplicate return dropped");
            }
            Observation::Unexpected(t) => {
                warn!(job_id = %self.job.id(), target = %t, "return from unexpected target dropped");
            }
            Observation::Late(t) => {
                info!(job_id = %self.job.id(), target = %t, "late return recorded");
            }
            Observation::Started | Observation::Unrelated => {}
        }
        observation
    }

    /// Checks the deadline.
    ///
    /// Once it has passed, already-queued events are drained: those the bus
    /// received by the deadline still count as returns, the others are
    /// recorded as late arrivals after the job turned `Partial`.
    pub fn poll(&mut self, now: Instant) -> JobStatus {
        if self.job.status().is_terminal() {
            return self.job.status();
        }
        let Some(at) = self.job.deadline_at().filter(|at| now > *at) else {
            return self.job.status();
        };

        let (in_time, late): (Vec<_>, Vec<_>) = self
            .drain_queued()
            .into_iter()
            .partition(|ev| ev.received <= at);
        for ev in &in_time {
            self.ingest(ev);
        }
        self.expire(now);
        for ev in &late {
            self.ingest(ev);
        }
        self.job.status()
    }

    /// Freezes the job as `Failed` (transport lost, run cancelled).
    pub fn fail(&mut self, reason: impl Into<String>) -> JobStatus {
        self.job.fail(reason)
    }

    /// Ends correlation; subscriptions are dropped with `self`.
    pub fn into_job(self) -> Job {
        self.job
    }

    fn expire(&mut self, now: Instant) {
        let before = self.job.status();
        if self.job.check_deadline(now) == JobStatus::Partial && before != JobStatus::Partial {
            let missing: Vec<_> = self.job.missing().map(ToString::to_string).collect();
            warn!(job_id = %self.job.id(), ?missing, "job deadline elapsed");
        }
    }

    fn drain_queued(&mut self) -> Vec<Event> {
        let mut queued = Vec::new();
        for sub in &mut self.subs {
            while let Some(ev) = sub.try_next() {
                queued.push(ev);
            }
        }
        queued.sort_by_key(|ev| ev.seq);
        queued
    }

    fn check_announced_minions(&self, event: &Event) {
        let Some(list) = event.data().get("minions").and_then(|v| v.as_array()) else {
            return;
        };
        let announced: std::collections::BTreeSet<&str> =
            list.iter().filter_map(|v| v.as_str()).collect();
        let expected: std::collections::BTreeSet<&str> =
            self.job.expected().iter().map(TargetId::as_str).collect();
        if announced != expected {
            warn!(
                job_id = %self.job.id(),
                ?announced,
                ?expected,
                "announced minions differ from expected targets"
            );
        }
    }
}
