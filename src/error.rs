//! Error types used by the bus, the dispatcher seam and the stage executor.
//!
//! - [`TransportError`]: the bus or its transport is unreachable.
//! - [`DispatchError`]: a fan-out stage could not be started.
//! - [`ConfigurationError`]: the stage sequence or run options are malformed;
//!   raised before the first dispatch, the run never starts.
//! - [`PatternError`]: a tag pattern could not be compiled.
//! - [`TailError`]: a bus tail stopped before its budget was spent.
//!
//! Two failure kinds are deliberately **not** errors: a target that never
//! answers is recorded as [`TargetStatus::TimedOut`](crate::TargetStatus), and a
//! remote resource that failed to apply is recorded as a
//! [`ResourceOutcome`](crate::ResourceOutcome) with `succeeded == false`.
//!
//! Every enum exposes `as_label` (stable snake_case, for logs/metrics) and
//! `as_message` (human-readable details).

use thiserror::Error;

/// # Errors produced by the event transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connecting to the endpoint failed.
    #[error("connect to {endpoint:?} failed: {reason}")]
    Connect {
        /// Endpoint that was dialed.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },

    /// The transport is gone; no further events will be delivered.
    #[error("transport disconnected")]
    Disconnected,

    /// Publishing an event failed.
    #[error("send failed: {reason}")]
    Send {
        /// Underlying failure.
        reason: String,
    },

    /// Receiving from the transport failed.
    #[error("receive failed: {reason}")]
    Receive {
        /// Underlying failure.
        reason: String,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stagevisor::TransportError;
    ///
    /// assert_eq!(TransportError::Disconnected.as_label(), "transport_disconnected");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Connect { .. } => "transport_connect",
            TransportError::Disconnected => "transport_disconnected",
            TransportError::Send { .. } => "transport_send",
            TransportError::Receive { .. } => "transport_receive",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TransportError::Connect { endpoint, reason } => {
                format!("cannot connect to {endpoint}: {reason}")
            }
            TransportError::Disconnected => "event bus disconnected".to_string(),
            TransportError::Send { reason } => format!("publish failed: {reason}"),
            TransportError::Receive { reason } => format!("receive failed: {reason}"),
        }
    }
}

/// # Errors produced when starting a job.
///
/// A stage whose dispatch fails is marked `Failed` immediately; no return
/// subscription is created for it.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// None of the requested targets is reachable.
    #[error("no reachable targets")]
    NoTargets,

    /// The dispatcher refused the job.
    #[error("dispatch rejected: {reason}")]
    Rejected {
        /// Why the job was refused.
        reason: String,
    },

    /// The transport failed while publishing the job.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::NoTargets => "dispatch_no_targets",
            DispatchError::Rejected { .. } => "dispatch_rejected",
            DispatchError::Transport(_) => "dispatch_transport",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DispatchError::NoTargets => "no reachable targets".to_string(),
            DispatchError::Rejected { reason } => format!("rejected: {reason}"),
            DispatchError::Transport(e) => e.as_message(),
        }
    }
}

/// # Malformed stage sequence or run options.
///
/// Validated before the stage loop begins; a run that fails validation never
/// dispatches anything.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A fan-out stage names no targets.
    #[error("stage {index}: fan-out stage has an empty target set")]
    EmptyTargets {
        /// Position of the stage in the sequence.
        index: usize,
    },

    /// A fan-out stage names no function.
    #[error("stage {index}: fan-out stage has no function")]
    EmptyFunction {
        /// Position of the stage in the sequence.
        index: usize,
    },

    /// Pillar overrides were supplied but are not a mapping.
    #[error("pillar data must be formatted as a dictionary")]
    InvalidPillar,

    /// A tag pattern could not be compiled.
    #[error("invalid tag pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler diagnostics.
        reason: String,
    },

    /// The stage source failed to produce the sequence.
    #[error("stage source failed: {reason}")]
    Source {
        /// Underlying failure.
        reason: String,
    },
}

impl ConfigurationError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stagevisor::ConfigurationError;
    ///
    /// let err = ConfigurationError::EmptyTargets { index: 2 };
    /// assert_eq!(err.as_label(), "config_empty_targets");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigurationError::EmptyTargets { .. } => "config_empty_targets",
            ConfigurationError::EmptyFunction { .. } => "config_empty_function",
            ConfigurationError::InvalidPillar => "config_invalid_pillar",
            ConfigurationError::InvalidPattern { .. } => "config_invalid_pattern",
            ConfigurationError::Source { .. } => "config_source",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// A tag pattern that cannot be turned into a matcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid tag pattern {pattern:?}: {reason}")]
pub struct PatternError {
    /// The offending pattern.
    pub pattern: String,
    /// Compiler diagnostics.
    pub reason: String,
}

impl From<PatternError> for ConfigurationError {
    fn from(e: PatternError) -> Self {
        ConfigurationError::InvalidPattern {
            pattern: e.pattern,
            reason: e.reason,
        }
    }
}

/// # Errors that end a bus tail.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TailError {
    /// The filter pattern cannot be compiled.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// The bus lost its transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Writing a matched event failed.
    #[error("cannot write event: {0}")]
    Output(#[from] std::io::Error),
}

impl TailError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TailError::Pattern(_) => "tail_pattern",
            TailError::Transport(e) => e.as_label(),
            TailError::Output(_) => "tail_output",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TailError::Transport(e) => e.as_message(),
            other => other.to_string(),
        }
    }
}
