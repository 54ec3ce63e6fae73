//! # Bus tail.
//!
//! Operator view of the event stream: every event whose tag matches a glob is
//! written as one line, `tag<TAB>json(data)`, until a match budget is spent or
//! the tail is cancelled.
//!
//! ```text
//! subscribe("*") ─► get_event(poll) ─┬─ None           → re-check cancel, keep waiting
//!                                    ├─ tag ∉ pattern  → debug "skipping event tag"
//!                                    └─ tag ∈ pattern  → write line (unless quiet), count -= 1
//!                                                          count reached 0 → return matched
//! ```
//!
//! `count < 1` means no budget: the tail only ends on cancellation or a lost bus.

use std::io::Write;
use std::time::Duration;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TailError;
use crate::events::{Event, EventBus, TagPattern};

/// What to tail and how to print it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TailOptions {
    /// Glob the tags must match.
    pub pattern: String,
    /// Matches to print before returning; `< 1` = unbounded.
    pub count: i64,
    /// Count matches without printing them.
    pub quiet: bool,
    /// Sorted keys, 4-space indented JSON instead of one compact line.
    pub pretty: bool,
    /// Longest single wait; bounds how late a cancellation is noticed.
    pub poll_interval: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            count: -1,
            quiet: false,
            pretty: false,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Writes matching events to `out` and returns how many matched.
///
/// Returns once `opts.count` events matched (when `count >= 1`) or `cancel`
/// fired. A lost bus is an error.
pub async fn tail<W: Write>(
    bus: &EventBus,
    opts: &TailOptions,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, TailError> {
    let pattern = TagPattern::new(&opts.pattern)?;
    let mut sub = bus.subscribe("*")?;
    let wait = opts.poll_interval.max(Duration::from_millis(1));
    let mut remaining = opts.count;
    let mut matched = 0u64;

    info!(pattern = %pattern, count = opts.count, "tailing event bus");
    while !cancel.is_cancelled() {
        let Some(ev) = bus.get_event(&mut sub, wait).await? else {
            continue;
        };
        if !pattern.is_match(ev.tag()) {
            debug!(tag = ev.tag(), "skipping event tag");
            continue;
        }

        matched += 1;
        if !opts.quiet {
            write_event(out, &ev, opts.pretty)?;
        }
        if remaining > 0 {
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }
    }
    Ok(matched)
}

fn write_event<W: Write>(out: &mut W, ev: &Event, pretty: bool) -> Result<(), TailError> {
    write!(out, "{}\t", ev.tag())?;
    if pretty {
        let mut ser = serde_json::Serializer::with_formatter(&mut *out, PrettyFormatter::with_indent(b"    "));
        ev.data().serialize(&mut ser).map_err(std::io::Error::from)?;
    } else {
        serde_json::to_writer(&mut *out, ev.data()).map_err(std::io::Error::from)?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::core::BusConfig;
    use crate::error::TransportError;
    use crate::events::{EventData, LocalTransport};
    use crate::policies::ReconnectPolicy;

    async fn local_bus() -> (EventBus, Arc<LocalTransport>) {
        let transport = Arc::new(LocalTransport::new());
        let cfg = BusConfig {
            poll_interval: Duration::from_millis(5),
            reconnect: ReconnectPolicy::disabled(),
            ..BusConfig::default()
        };
        let bus = EventBus::connect(transport.clone(), cfg).await.unwrap();
        (bus, transport)
    }

    fn data(v: serde_json::Value) -> EventData {
        v.as_object().cloned().unwrap_or_default()
    }

    fn publish_later(bus: &EventBus, events: Vec<(&'static str, serde_json::Value)>) {
        let bus = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            for (tag, v) in events {
                bus.publish(tag, data(v)).await.unwrap();
            }
        });
    }

    fn opts(pattern: &str, count: i64) -> TailOptions {
        TailOptions {
            pattern: pattern.to_string(),
            count,
            poll_interval: Duration::from_millis(10),
            ..TailOptions::default()
        }
    }

    #[tokio::test]
    async fn budget_of_two_prints_two_lines() {
        let (bus, _t) = local_bus().await;
        publish_later(
            &bus,
            vec![
                ("job/1/new", json!({"minions": ["w1"]})),
                ("salt/auth", json!({"id": "w9"})),
                ("job/1/ret/w1", json!({"success": true})),
            ],
        );

        let mut out = Vec::new();
        let n = tail(&bus, &opts("*", 2), &mut out, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(n, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "job/1/new\t{\"minions\":[\"w1\"]}",
                "salt/auth\t{\"id\":\"w9\"}"
            ]
        );
    }

    #[tokio::test]
    async fn non_matching_tags_are_skipped() {
        let (bus, _t) = local_bus().await;
        publish_later(
            &bus,
            vec![
                ("salt/auth", json!({})),
                ("job/7/ret/w1", json!({"retcode": 0})),
            ],
        );

        let mut out = Vec::new();
        let n = tail(&bus, &opts("job/*/ret/*", 1), &mut out, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(n, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "job/7/ret/w1\t{\"retcode\":0}\n");
    }

    #[tokio::test]
    async fn pretty_output_is_sorted_and_indented() {
        let (bus, _t) = local_bus().await;
        publish_later(&bus, vec![("t", json!({"b": 1, "a": 2}))]);

        let mut out = Vec::new();
        let tail_opts = TailOptions {
            pretty: true,
            ..opts("t", 1)
        };
        tail(&bus, &tail_opts, &mut out, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "t\t{\n    \"a\": 2,\n    \"b\": 1\n}\n"
        );
    }

    #[tokio::test]
    async fn quiet_counts_without_printing() {
        let (bus, _t) = local_bus().await;
        publish_later(&bus, vec![("a", json!({})), ("b", json!({}))]);

        let mut out = Vec::new();
        let tail_opts = TailOptions {
            quiet: true,
            ..opts("*", 2)
        };
        let n = tail(&bus, &tail_opts, &mut out, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn unbounded_tail_ends_on_cancel() {
        let (bus, _t) = local_bus().await;
        publish_later(&bus, vec![("a", json!({})), ("b", json!({}))]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let mut out = Vec::new();
        let n = tail(&bus, &opts("*", -1), &mut out, &cancel).await.unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn lost_bus_is_an_error() {
        let (bus, transport) = local_bus().await;
        transport.sever();

        let mut out = Vec::new();
        let err = tail(&bus, &opts("*", 1), &mut out, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TailError::Transport(TransportError::Disconnected)));
    }
}
