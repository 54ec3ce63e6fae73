//! # ObserverSet: non-blocking fan-out of run progress
//!
//! [`ObserverSet`] hands each [`Progress`] event to every observer **without
//! awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&Progress)` returns immediately.
//! - Per-observer FIFO (queue order).
//! - Panics inside observers are caught and logged (isolation).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different observers.
//! - No retries on per-observer queue overflow (events are dropped for that observer).
//!
//! ## Diagram
//! ```text
//!    emit(&Progress)
//!        │                        (Arc-clone per observer)
//!        ├────────────────► [queue O1] ─► worker O1 ─► on_progress()
//!        ├────────────────► [queue O2] ─► worker O2 ─► on_progress()
//!        └────────────────► [queue ON] ─► worker ON ─► on_progress()
//! ```

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, warn};

use super::Observe;
use crate::progress::Progress;

struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Progress>>,
}

/// Fan-out with per-observer bounded queues and worker tasks.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl ObserverSet {
    /// Creates a set and spawns one worker per observer.
    ///
    /// `default_capacity` applies to observers without a preference. Must be
    /// called inside a Tokio runtime when `observers` is not empty.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>, default_capacity: usize) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for obs in observers {
            let cap = obs.queue_capacity().unwrap_or(default_capacity).max(1);
            let name = obs.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Progress>>(cap);

            let handle = tokio::spawn(async move {
                while let Some(p) = rx.recv().await {
                    let fut = obs.on_progress(p.as_ref());
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        error!(
                            observer = obs.name(),
                            info = %panic_message(&*panic),
                            "observer panicked"
                        );
                    }
                }
            });

            channels.push(ObserverChannel { name, sender: tx });
            workers.push(handle);
        }

        Self { channels, workers }
    }

    /// Set without observers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            channels: Vec::new(),
            workers: Vec::new(),
        }
    }

    /// Fans one event out to all observers (non-blocking).
    pub fn emit(&self, progress: Progress) {
        if self.channels.is_empty() {
            return;
        }
        let p = Arc::new(progress);
        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&p)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(observer = channel.name, seq = p.seq, "observer dropped progress: queue full");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(observer = channel.name, seq = p.seq, "observer dropped progress: worker closed");
                }
            }
        }
    }

    /// Closes all queues and waits until every worker has drained its queue.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no observers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
