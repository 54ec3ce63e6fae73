//! # Reconnect policy for the bus pump.
//!
//! When the transport fails while the bus is receiving, the pump re-dials the
//! endpoint up to `attempts` times, sleeping `backoff.next(n)` before attempt
//! `n`. After the last failed attempt the bus is marked disconnected and every
//! waiter receives `TransportError::Disconnected`.

use std::time::Duration;

use super::backoff::BackoffPolicy;

/// How hard the bus tries to get its transport back.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    /// Number of re-dial attempts (`0` = give up immediately).
    pub attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
}

impl ReconnectPolicy {
    /// Never reconnect.
    pub fn disabled() -> Self {
        Self {
            attempts: 0,
            backoff: BackoffPolicy::default(),
        }
    }

    /// `attempts` tries, `delay` apart.
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            backoff: BackoffPolicy::constant(delay),
        }
    }
}

impl Default for ReconnectPolicy {
    /// Five attempts on the default backoff schedule.
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: BackoffPolicy::default(),
        }
    }
}
