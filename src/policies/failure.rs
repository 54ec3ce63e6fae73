//! # Run-level failure policy.
//!
//! Decides what the stage executor does after a stage ends in anything other
//! than `Complete` (a target timed out, dispatch failed, the transport broke,
//! or a collected result stage carries failed resources).
//!
//! ```text
//! FailurePolicy::Continue   → record the stage, log, run the next stage (default)
//! FailurePolicy::Abort      → record the stage, stop, report the run as Aborted
//! ```
//!
//! The policy is set once per run, never per stage.

/// What to do when a stage does not complete cleanly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run after the failing stage.
    Abort,
    /// Record the failure and keep going (default).
    #[default]
    Continue,
}

impl FailurePolicy {
    /// True if a failing stage ends the run.
    #[inline]
    pub fn stops_run(&self) -> bool {
        matches!(self, FailurePolicy::Abort)
    }

    /// Stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            FailurePolicy::Abort => "abort",
            FailurePolicy::Continue => "continue",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keeps_going() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Continue);
        assert!(!FailurePolicy::Continue.stops_run());
        assert!(FailurePolicy::Abort.stops_run());
    }
}
