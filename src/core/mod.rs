//! Run core: configuration and the stage loop.
//!
//! The public API from this module is [`StageExecutor`] plus its configuration
//! types.
//!
//! Internal modules:
//! - [`config`]: run, bus and per-run option settings;
//! - [`executor`]: validates the sequence, walks it, applies the failure policy;
//! - [`collect`]: executes one stage (dispatch, correlate, record);
//! - [`shutdown`]: cross-platform stop signal handling.

mod collect;
mod config;
mod executor;
mod shutdown;

pub use config::{BusConfig, RunConfig, RunOptions};
pub use executor::StageExecutor;
pub use shutdown::wait_for_shutdown_signal;
