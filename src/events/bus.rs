//! # Tag-addressed publish/subscribe bus.
//!
//! [`EventBus`] sits on top of a [`Transport`]. Outgoing events go straight to
//! the transport; a background pump drains the transport and routes every
//! incoming message to the live subscriptions whose pattern matches its tag.
//!
//! ## Architecture
//! ```text
//! publish(tag, data) ──► Transport ──► pump (receive loop) ──► route(Event)
//!                                          │                     │ lock(table)
//!                                          │                     ├──► [queue S1] ─► next_event / get_event
//!                                          │                     ├──► [queue S2]
//!                                          │                     └──► [queue SN]
//!                                          └─ receive error ─► reconnect (backoff) ─► give up ─► disconnect
//! ```
//!
//! ## Rules
//! - **FIFO per subscription**: events reach one subscription in pump order.
//! - **Bounded queues**: each subscription buffers at most
//!   `BusConfig::subscription_queue` events; when full, new events for it are
//!   dropped with a warning and do not count against its budget.
//! - **No history**: a subscription only sees events routed after it exists;
//!   subscribe before triggering anything you expect to hear about.
//! - **Budgets**: a subscription created with `count >= 1` is removed from the
//!   table after `count` matches; `count < 1` means unbounded.
//! - **Single owning lock**: the subscription table is one `Mutex`; routing and
//!   (un)subscribing never interleave, so nothing is lost while subscribing.
//! - **Disconnect**: once the transport is gone every queue is closed and
//!   waiters receive [`TransportError::Disconnected`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

use super::event::{Event, EventData};
use super::pattern::TagPattern;
use super::transport::Transport;
use crate::core::BusConfig;
use crate::error::{PatternError, TransportError};

/// Result of waiting on a set of subscriptions.
#[derive(Debug)]
pub enum NextEvent {
    /// A matching event arrived.
    Event(Event),
    /// The timeout elapsed first.
    Timeout,
    /// The cancellation token fired first.
    Cancelled,
    /// Every subscription in the set has spent its match budget.
    Exhausted,
}

struct Slot {
    id: u64,
    pattern: TagPattern,
    remaining: Option<u64>,
    tx: mpsc::Sender<Event>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    table: Mutex<Vec<Slot>>,
    connected: AtomicBool,
    next_id: AtomicU64,
    queue: usize,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn route(&self, event: Event) {
        let mut table = self.table();
        let mut delivered = 0usize;
        table.retain_mut(|slot| {
            if !slot.pattern.is_match(event.tag()) {
                return true;
            }
            match slot.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscription = slot.id,
                        pattern = %slot.pattern,
                        tag = event.tag(),
                        seq = event.seq,
                        "subscription dropped event: queue full"
                    );
                    return true;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return false,
            }
            delivered += 1;
            match slot.remaining.as_mut() {
                Some(n) => {
                    *n -= 1;
                    *n > 0
                }
                None => true,
            }
        });
        trace!(tag = event.tag(), seq = event.seq, delivered, "event routed");
    }

    fn remove(&self, id: u64) {
        self.table().retain(|slot| slot.id != id);
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.table().clear();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Handle to one subscription; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    pattern: TagPattern,
    rx: mpsc::Receiver<Event>,
    closed: bool,
    shared: Arc<Shared>,
}

impl Subscription {
    /// Pattern this subscription was created with.
    pub fn pattern(&self) -> &TagPattern {
        &self.pattern
    }

    /// True once the queue is drained and no more events can arrive
    /// (budget spent or bus disconnected).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pops an already-queued event without waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.remove(self.id);
    }
}

/// Cloneable handle to the bus. The pump stops when the last handle is dropped.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
    _pump: Arc<DropGuard>,
}

impl EventBus {
    /// Connects `transport` to `cfg.endpoint` and starts the receive pump.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        cfg: BusConfig,
    ) -> Result<Self, TransportError> {
        transport.connect(&cfg.endpoint).await?;
        info!(endpoint = %cfg.endpoint, "event bus connected");

        let shared = Arc::new(Shared {
            transport,
            table: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            next_id: AtomicU64::new(0),
            queue: cfg.subscription_queue_clamped(),
        });

        let token = CancellationToken::new();
        tokio::spawn(pump(Arc::clone(&shared), cfg, token.clone()));

        Ok(Self {
            shared,
            _pump: Arc::new(token.drop_guard()),
        })
    }

    /// Publishes one event; fails only when the transport is unusable.
    pub async fn publish(&self, tag: &str, data: EventData) -> Result<(), TransportError> {
        if !self.shared.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.shared.transport.publish(tag, &data).await?;
        debug!(tag, "event published");
        Ok(())
    }

    /// Subscribes to every tag matching `pattern`, without a match budget.
    pub fn subscribe(&self, pattern: &str) -> Result<Subscription, PatternError> {
        self.subscribe_counted(pattern, -1)
    }

    /// Subscribes with a match budget: after `count` matches the subscription
    /// deactivates. `count < 1` means unbounded.
    pub fn subscribe_counted(
        &self,
        pattern: &str,
        count: i64,
    ) -> Result<Subscription, PatternError> {
        let pattern = TagPattern::new(pattern)?;
        let (tx, rx) = mpsc::channel(self.shared.queue);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let remaining = u64::try_from(count).ok().filter(|n| *n > 0);

        {
            let mut table = self.shared.table();
            // checked under the lock so a concurrent disconnect cannot leave a live slot behind
            if self.shared.is_connected() {
                table.push(Slot {
                    id,
                    pattern: pattern.clone(),
                    remaining,
                    tx,
                });
            }
        }
        debug!(pattern = %pattern, id, ?remaining, "subscribed");

        Ok(Subscription {
            id,
            pattern,
            rx,
            closed: false,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Waits until any subscription in `subs` yields an event, `timeout`
    /// elapses, or `cancel` fires.
    ///
    /// Expiry and cancellation are ordinary results, not errors; the only
    /// error is a disconnected transport.
    pub async fn next_event(
        &self,
        subs: &mut [Subscription],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<NextEvent, TransportError> {
        enum Step {
            Done(NextEvent),
            Closed(usize),
            AllClosed,
        }

        let deadline = Instant::now() + timeout;
        loop {
            if cancel.is_cancelled() {
                return Ok(NextEvent::Cancelled);
            }

            let step = {
                let mut index = Vec::with_capacity(subs.len());
                let mut waits = Vec::with_capacity(subs.len());
                for (i, sub) in subs.iter_mut().enumerate() {
                    if !sub.closed {
                        index.push(i);
                        waits.push(Box::pin(sub.rx.recv()));
                    }
                }

                if waits.is_empty() {
                    Step::AllClosed
                } else {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Step::Done(NextEvent::Cancelled),
                        (res, pos, _) = futures::future::select_all(waits) => match res {
                            Some(ev) => Step::Done(NextEvent::Event(ev)),
                            None => Step::Closed(index[pos]),
                        },
                        _ = time::sleep_until(deadline) => Step::Done(NextEvent::Timeout),
                    }
                }
            };

            match step {
                Step::Done(next) => return Ok(next),
                Step::Closed(i) => {
                    if !self.shared.is_connected() {
                        return Err(TransportError::Disconnected);
                    }
                    subs[i].closed = true;
                }
                Step::AllClosed => {
                    return if self.shared.is_connected() {
                        Ok(NextEvent::Exhausted)
                    } else {
                        Err(TransportError::Disconnected)
                    };
                }
            }
        }
    }

    /// Bare read: the next event of `sub`, or `None` if nothing shows up within `wait`.
    ///
    /// Lets a cooperative consumer loop and re-check its own stop condition
    /// instead of blocking forever.
    pub async fn get_event(
        &self,
        sub: &mut Subscription,
        wait: Duration,
    ) -> Result<Option<Event>, TransportError> {
        if let Some(ev) = sub.try_next() {
            return Ok(Some(ev));
        }
        if !sub.closed {
            match time::timeout(wait, sub.rx.recv()).await {
                Ok(Some(ev)) => return Ok(Some(ev)),
                Ok(None) => sub.closed = true,
                Err(_elapsed) => return Ok(None),
            }
        }
        if self.shared.is_connected() {
            Ok(None)
        } else {
            Err(TransportError::Disconnected)
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.table().len()
    }

    /// False once the transport was lost for good.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }
}

/// Receive loop: transport → subscription table.
async fn pump(shared: Arc<Shared>, cfg: BusConfig, token: CancellationToken) {
    let wait = cfg.poll_interval_clamped();
    loop {
        let res = tokio::select! {
            _ = token.cancelled() => break,
            r = shared.transport.receive(wait) => r,
        };

        match res {
            Ok(Some(raw)) => shared.route(Event::from(raw)),
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, label = e.as_label(), "event transport failed");
                if !reconnect(&shared, &cfg, &token).await {
                    break;
                }
            }
        }
    }

    if !token.is_cancelled() {
        shared.disconnect();
        warn!(endpoint = %cfg.endpoint, "event bus disconnected");
    }
}

/// Re-dials the transport per the reconnect policy; false when it gave up (or was cancelled).
async fn reconnect(shared: &Shared, cfg: &BusConfig, token: &CancellationToken) -> bool {
    for attempt in 0..cfg.reconnect.attempts {
        let delay = cfg.reconnect.backoff.next(attempt);
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = time::sleep(delay) => {}
        }

        match shared.transport.connect(&cfg.endpoint).await {
            Ok(()) => {
                info!(endpoint = %cfg.endpoint, attempt = attempt + 1, "event bus reconnected");
                return true;
            }
            Err(e) => {
                warn!(error = %e, attempt = attempt + 1, ?delay, "reconnect failed");
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LocalTransport;
    use crate::policies::ReconnectPolicy;
    use serde_json::json;

    fn data(v: serde_json::Value) -> EventData {
        match v {
            serde_json::Value::Object(m) => m,
            _ => EventData::new(),
        }
    }

    fn quick_cfg() -> BusConfig {
        BusConfig {
            poll_interval: Duration::from_millis(5),
            reconnect: ReconnectPolicy::disabled(),
            ..BusConfig::default()
        }
    }

    async fn local_bus() -> (EventBus, Arc<LocalTransport>) {
        let transport = Arc::new(LocalTransport::new());
        let bus = EventBus::connect(transport.clone(), quick_cfg())
            .await
            .unwrap();
        (bus, transport)
    }

    async fn expect_event(bus: &EventBus, sub: &mut Subscription) -> Event {
        let token = CancellationToken::new();
        match bus
            .next_event(std::slice::from_mut(sub), Duration::from_secs(2), &token)
            .await
            .unwrap()
        {
            NextEvent::Event(ev) => ev,
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delivers_matching_events_in_publish_order() {
        let (bus, _t) = local_bus().await;
        let mut sub = bus.subscribe("job/42/ret/*").unwrap();

        bus.publish("job/42/ret/w1", data(json!({"n": 1}))).await.unwrap();
        bus.publish("job/43/ret/w1", data(json!({"n": 2}))).await.unwrap();
        bus.publish("job/42/ret/w2", data(json!({"n": 3}))).await.unwrap();

        let a = expect_event(&bus, &mut sub).await;
        let b = expect_event(&bus, &mut sub).await;
        assert_eq!(a.tag(), "job/42/ret/w1");
        assert_eq!(b.tag(), "job/42/ret/w2");
        assert!(a.seq < b.seq);
    }

    #[tokio::test]
    async fn timeout_is_not_an_error() {
        let (bus, _t) = local_bus().await;
        let mut subs = vec![bus.subscribe("nothing/*").unwrap()];
        let token = CancellationToken::new();
        let next = bus
            .next_event(&mut subs, Duration::from_millis(20), &token)
            .await
            .unwrap();
        assert!(matches!(next, NextEvent::Timeout));
    }

    #[tokio::test]
    async fn cancellation_wakes_the_waiter() {
        let (bus, _t) = local_bus().await;
        let mut subs = vec![bus.subscribe("nothing/*").unwrap()];
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let next = bus
            .next_event(&mut subs, Duration::from_secs(30), &token)
            .await
            .unwrap();
        assert!(matches!(next, NextEvent::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn waits_on_several_subscriptions() {
        let (bus, _t) = local_bus().await;
        let mut subs = vec![
            bus.subscribe("job/1/new").unwrap(),
            bus.subscribe("job/1/ret/*").unwrap(),
        ];
        bus.publish("job/1/ret/w1", EventData::new()).await.unwrap();

        let token = CancellationToken::new();
        match bus
            .next_event(&mut subs, Duration::from_secs(2), &token)
            .await
            .unwrap()
        {
            NextEvent::Event(ev) => assert_eq!(ev.tag(), "job/1/ret/w1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn budget_deactivates_subscription() {
        let (bus, _t) = local_bus().await;
        let mut sub = bus.subscribe_counted("tick/*", 2).unwrap();
        assert_eq!(bus.subscription_count(), 1);

        for i in 0..3 {
            bus.publish(&format!("tick/{i}"), EventData::new()).await.unwrap();
        }
        assert_eq!(expect_event(&bus, &mut sub).await.tag(), "tick/0");
        assert_eq!(expect_event(&bus, &mut sub).await.tag(), "tick/1");

        let token = CancellationToken::new();
        let mut subs = vec![sub];
        let next = bus
            .next_event(&mut subs, Duration::from_millis(200), &token)
            .await
            .unwrap();
        assert!(matches!(next, NextEvent::Exhausted));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn idle_subscription_keeps_at_most_its_capacity() {
        let transport = Arc::new(LocalTransport::new());
        let cfg = BusConfig {
            subscription_queue: 4,
            ..quick_cfg()
        };
        let bus = EventBus::connect(transport, cfg).await.unwrap();
        let mut idle = bus.subscribe("*").unwrap();
        let mut counted = bus.subscribe_counted("*", 6).unwrap();

        for i in 0..10 {
            bus.publish(&format!("tick/{i}"), EventData::new()).await.unwrap();
        }
        time::sleep(Duration::from_millis(50)).await;

        let mut kept = Vec::new();
        while let Some(ev) = idle.try_next() {
            kept.push(ev.tag().to_string());
        }
        assert_eq!(kept, vec!["tick/0", "tick/1", "tick/2", "tick/3"]);

        // dropped events do not spend the budget
        let mut seen = 0;
        while counted.try_next().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 4);
        assert_eq!(bus.subscription_count(), 2);

        bus.publish("after", EventData::new()).await.unwrap();
        assert_eq!(expect_event(&bus, &mut idle).await.tag(), "after");
    }

    #[tokio::test]
    async fn late_subscribers_get_no_history() {
        let (bus, _t) = local_bus().await;
        let mut early = bus.subscribe("*").unwrap();
        bus.publish("first", EventData::new()).await.unwrap();
        assert_eq!(expect_event(&bus, &mut early).await.tag(), "first");

        let mut late = bus.subscribe("*").unwrap();
        assert!(bus
            .get_event(&mut late, Duration::from_millis(20))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn bare_read_returns_none_when_idle() {
        let (bus, _t) = local_bus().await;
        let mut sub = bus.subscribe("*").unwrap();
        assert!(bus
            .get_event(&mut sub, Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());

        bus.publish("x", EventData::new()).await.unwrap();
        let ev = bus.get_event(&mut sub, Duration::from_secs(2)).await.unwrap();
        assert_eq!(ev.map(|e| e.tag().to_string()).as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn dropping_a_subscription_unsubscribes() {
        let (bus, _t) = local_bus().await;
        let sub = bus.subscribe("*").unwrap();
        assert_eq!(bus.subscription_count(), 1);
        drop(sub);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn lost_transport_surfaces_as_error() {
        let (bus, transport) = local_bus().await;
        let mut subs = vec![bus.subscribe("*").unwrap()];
        transport.sever();

        let token = CancellationToken::new();
        let res = bus
            .next_event(&mut subs, Duration::from_secs(2), &token)
            .await;
        assert_eq!(res.unwrap_err(), TransportError::Disconnected);
        assert!(!bus.is_connected());
        assert_eq!(
            bus.publish("x", EventData::new()).await,
            Err(TransportError::Disconnected)
        );
    }

    #[tokio::test]
    async fn pump_reconnects_within_budget() {
        let transport = Arc::new(LocalTransport::new());
        let cfg = BusConfig {
            poll_interval: Duration::from_millis(5),
            reconnect: ReconnectPolicy::fixed(5, Duration::from_millis(5)),
            ..BusConfig::default()
        };
        let bus = EventBus::connect(transport.clone(), cfg).await.unwrap();
        let mut sub = bus.subscribe("*").unwrap();

        transport.sever();
        time::sleep(Duration::from_millis(8)).await;
        transport.restore();
        time::sleep(Duration::from_millis(60)).await;

        assert!(bus.is_connected());
        bus.publish("after", EventData::new()).await.unwrap();
        assert_eq!(expect_event(&bus, &mut sub).await.tag(), "after");
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let transport = Arc::new(LocalTransport::new());
        transport.sever();
        let res = EventBus::connect(transport, quick_cfg()).await;
        assert!(matches!(res, Err(TransportError::Connect { .. })));
    }
}
