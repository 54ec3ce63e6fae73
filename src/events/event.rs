//! # Tagged bus events.
//!
//! An [`Event`] is a hierarchical tag plus a JSON mapping. Events are immutable
//! once published; the bus hands out cheap clones (`Arc`-backed payload).
//!
//! ## Tag layout
//! ```text
//! job/<job_id>/new             job accepted by the dispatcher (data: {"minions": [...]})
//! job/<job_id>/ret/<target>    one target's return (data: {"return": {...}, "success": bool})
//! ```
//!
//! ## Ordering
//! Each event carries a process-wide sequence number (`seq`) assigned when it
//! enters the bus; within one subscription events arrive in `seq` order.
//! `received` is the monotonic instant the event entered the bus, so a consumer
//! that reads late can still tell whether an event arrived before a deadline.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use stagevisor::Event;
//!
//! let ev = Event::new("job/42/ret/web-1", json!({"success": true}));
//! assert_eq!(ev.tag(), "job/42/ret/web-1");
//! assert_eq!(ev.last_segment(), "web-1");
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::{Map, Value};
use tokio::time::Instant;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Payload carried by every event.
pub type EventData = Map<String, Value>;

/// Prefix shared by all job tags.
pub const JOB_TAG_PREFIX: &str = "job";

/// Tag announcing that a job was accepted: `job/<id>/new`.
pub fn job_new_tag(job_id: &str) -> String {
    format!("{JOB_TAG_PREFIX}/{job_id}/new")
}

/// Tag for one target's return: `job/<id>/ret/<target>`.
pub fn job_ret_tag(job_id: &str, target: &str) -> String {
    format!("{JOB_TAG_PREFIX}/{job_id}/ret/{target}")
}

/// Pattern matching every return of a job: `job/<id>/ret/*`.
pub fn job_ret_pattern(job_id: &str) -> String {
    format!("{JOB_TAG_PREFIX}/{job_id}/ret/*")
}

/// Message as handed over by a transport (already decoded).
#[derive(Clone, Debug, PartialEq)]
pub struct RawMessage {
    /// Event tag.
    pub tag: String,
    /// Event payload.
    pub data: EventData,
}

impl RawMessage {
    /// Builds a raw message; non-object `data` is wrapped as `{"data": value}`.
    pub fn new(tag: impl Into<String>, data: Value) -> Self {
        Self {
            tag: tag.into(),
            data: into_data(data),
        }
    }
}

/// One published event.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Monotonic instant the event entered the bus.
    pub received: Instant,
    tag: Arc<str>,
    data: Arc<EventData>,
}

impl Event {
    /// Creates an event with the current timestamp and the next sequence number.
    ///
    /// Non-object `data` is wrapped as `{"data": value}` so the payload is always a mapping.
    pub fn new(tag: impl Into<Arc<str>>, data: Value) -> Self {
        Self::from_parts(tag, into_data(data))
    }

    /// Creates an event from an already-built mapping.
    pub fn from_parts(tag: impl Into<Arc<str>>, data: EventData) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            received: Instant::now(),
            tag: tag.into(),
            data: Arc::new(data),
        }
    }

    /// Event tag.
    #[inline]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Event payload.
    #[inline]
    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// Last `/`-separated segment of the tag (the target id on return tags).
    pub fn last_segment(&self) -> &str {
        self.tag.rsplit('/').next().unwrap_or_default()
    }

    /// True if this is a `job/<job_id>/new` event.
    pub fn is_job_new(&self, job_id: &str) -> bool {
        *self.tag == job_new_tag(job_id)
    }
}

impl From<RawMessage> for Event {
    fn from(raw: RawMessage) -> Self {
        Event::from_parts(raw.tag, raw.data)
    }
}

fn into_data(data: Value) -> EventData {
    match data {
        Value::Object(map) => map,
        Value::Null => EventData::new(),
        other => {
            let mut map = EventData::new();
            map.insert("data".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new("a", json!({}));
        let b = Event::new("b", json!({}));
        assert!(b.seq > a.seq);
    }

    #[test]
    fn scalar_payload_is_wrapped() {
        let ev = Event::new("t", json!(7));
        assert_eq!(ev.data().get("data"), Some(&json!(7)));
        assert!(Event::new("t", Value::Null).data().is_empty());
    }

    #[test]
    fn job_tags_round_out_the_layout() {
        assert_eq!(job_new_tag("42"), "job/42/new");
        assert_eq!(job_ret_tag("42", "w1"), "job/42/ret/w1");
        assert_eq!(job_ret_pattern("42"), "job/42/ret/*");

        let ev = Event::new(job_ret_tag("42", "w1"), json!({}));
        assert_eq!(ev.last_segment(), "w1");
        assert!(!ev.is_job_new("42"));
        assert!(Event::new(job_new_tag("42"), json!({})).is_job_new("42"));
    }
}
