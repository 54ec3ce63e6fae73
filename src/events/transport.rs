//! # Transport seam under the event bus.
//!
//! The bus never encodes or decodes anything itself: a [`Transport`] delivers
//! already-decoded [`RawMessage`]s and accepts outgoing tag/data pairs.
//!
//! [`LocalTransport`] is an in-process loopback used by embedded deployments
//! and tests: whatever is published is received back in publish order. It can
//! be [`sever`](LocalTransport::sever)ed to simulate a lost connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::event::{EventData, RawMessage};
use crate::error::TransportError;

/// Contract for the wire underneath [`EventBus`](crate::EventBus).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// (Re)establishes the connection to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<(), TransportError>;

    /// Sends one event.
    async fn publish(&self, tag: &str, data: &EventData) -> Result<(), TransportError>;

    /// Waits up to `timeout` for the next message; `Ok(None)` on expiry.
    async fn receive(&self, timeout: Duration) -> Result<Option<RawMessage>, TransportError>;
}

/// In-process loopback transport.
pub struct LocalTransport {
    tx: mpsc::UnboundedSender<RawMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<RawMessage>>,
    connected: AtomicBool,
    severed: AtomicBool,
}

impl LocalTransport {
    /// Creates a disconnected loopback; call [`Transport::connect`] (the bus does) before use.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            connected: AtomicBool::new(false),
            severed: AtomicBool::new(false),
        }
    }

    /// Drops the connection; later `connect` calls fail until [`restore`](Self::restore).
    pub fn sever(&self) {
        self.severed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Allows `connect` to succeed again.
    pub fn restore(&self) {
        self.severed.store(false, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, tag: &str, data: &EventData) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.tx
            .send(RawMessage {
                tag: tag.to_string(),
                data: data.clone(),
            })
            .map_err(|_| TransportError::Send {
                reason: "loopback closed".to_string(),
            })
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<RawMessage>, TransportError> {
        self.ensure_connected()?;
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Err(TransportError::Disconnected),
            Err(_elapsed) => {
                // the wait may have spanned a sever()
                self.ensure_connected()?;
                Ok(None)
            }
        }
    }
}
