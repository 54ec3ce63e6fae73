//! # Dispatcher seam.
//!
//! The executor does not know how jobs reach remote agents. A [`Dispatcher`]
//! starts one job and returns its id; the agents then announce
//! `job/<id>/new` and `job/<id>/ret/<target>` on the bus.
//!
//! Returns must not be published before `dispatch` has returned: the
//! executor subscribes to the job's tags only once it knows the id, and the
//! bus keeps no history.
//!
//! ## Example (skeleton)
//! ```rust
//! use async_trait::async_trait;
//! use stagevisor::{DispatchError, Dispatcher, EventData, JobId, TargetId};
//!
//! struct Refuser;
//!
//! #[async_trait]
//! impl Dispatcher for Refuser {
//!     async fn dispatch(
//!         &self,
//!         _targets: &[TargetId],
//!         _function: &str,
//!         _args: &EventData,
//!     ) -> Result<JobId, DispatchError> {
//!         Err(DispatchError::NoTargets)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::events::EventData;
use crate::jobs::{JobId, TargetId};

/// Starts jobs on remote targets.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Starts `function(args)` on `targets` and returns the job id.
    ///
    /// Fails with [`DispatchError::NoTargets`] when none of the targets is
    /// reachable, or with a transport error.
    async fn dispatch(
        &self,
        targets: &[TargetId],
        function: &str,
        args: &EventData,
    ) -> Result<JobId, DispatchError>;

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
