//! # Core observer trait
//!
//! `Observe` is the extension point for plugging progress handlers into a run.
//! Each observer is driven by a dedicated worker fed by a bounded queue owned by
//! the [`ObserverSet`](crate::observers::ObserverSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching); they do **not** block the
//!   executor nor other observers.
//! - If a queue overflows, progress events for that observer are **dropped** (warn).
//!
//! ## Example (skeleton)
//! ```rust
//! use async_trait::async_trait;
//! use stagevisor::{Observe, Progress, ProgressKind};
//!
//! struct FailureCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait]
//! impl Observe for FailureCounter {
//!     async fn on_progress(&self, p: &Progress) {
//!         if p.kind == ProgressKind::ResourceFailed {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "failure-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::progress::Progress;

/// Contract for progress observers.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Handle a single progress event.
    async fn on_progress(&self, progress: &Progress);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity; `None` uses the run's
    /// [`observer_queue`](crate::RunConfig::observer_queue).
    fn queue_capacity(&self) -> Option<usize> {
        None
    }
}
