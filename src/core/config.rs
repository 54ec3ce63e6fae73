//! # Run and bus configuration.
//!
//! - [`RunConfig`] how the executor waits and reacts to failures
//! - [`BusConfig`] how the event bus talks to its transport
//! - [`RunOptions`] per-run knobs forwarded to dispatched functions
//!
//! ## Sentinel values
//! - `job_timeout = 0s` → jobs have no deadline (wait until complete or cancelled)
//! - `poll_interval = 0s` → clamped to 1ms
//! - `observer_queue = 0` → clamped to 1
//! - `subscription_queue = 0` → clamped to 1
//! - `reconnect.attempts = 0` → a lost transport is final

use std::time::Duration;

use serde_json::Value;

use crate::error::ConfigurationError;
use crate::events::{EventData, TagPattern};
use crate::policies::{FailurePolicy, ReconnectPolicy};
use crate::stages::FanOutStage;

const MIN_POLL: Duration = Duration::from_millis(1);

/// Executor configuration.
///
/// ## Field semantics
/// - `failure_policy`: what happens after a stage that did not complete (`Continue` by default)
/// - `job_timeout`: deadline per fan-out job, measured from dispatch (`0s` = none)
/// - `poll_interval`: longest single wait on the bus; bounds how late a
///   deadline or a cancellation is noticed
/// - `observer_queue`: capacity of each progress observer's queue
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Run-level failure policy.
    pub failure_policy: FailurePolicy,

    /// Per-job deadline.
    ///
    /// - `Duration::ZERO` = no deadline
    /// - `> 0` = targets that did not return in time are recorded as timed out
    pub job_timeout: Duration,

    /// Upper bound of one wait on the bus.
    pub poll_interval: Duration,

    /// Default queue capacity for progress observers.
    pub observer_queue: usize,
}

impl RunConfig {
    /// Returns the job deadline as an `Option`.
    ///
    /// - `None` → wait until every target returned
    /// - `Some(d)` → jobs turn partial after `d`
    #[inline]
    pub fn job_deadline(&self) -> Option<Duration> {
        if self.job_timeout == Duration::ZERO {
            None
        } else {
            Some(self.job_timeout)
        }
    }

    /// Poll interval clamped to a minimum of 1ms.
    #[inline]
    pub fn poll_interval_clamped(&self) -> Duration {
        self.poll_interval.max(MIN_POLL)
    }

    /// Observer queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn observer_queue_clamped(&self) -> usize {
        self.observer_queue.max(1)
    }
}

impl Default for RunConfig {
    /// Default configuration:
    ///
    /// - `failure_policy = Continue`
    /// - `job_timeout = 300s`
    /// - `poll_interval = 250ms`
    /// - `observer_queue = 1024`
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            job_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(250),
            observer_queue: 1024,
        }
    }
}

/// Event bus configuration.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Endpoint handed to [`Transport::connect`](crate::Transport::connect).
    pub endpoint: String,

    /// Receive timeout of the bus pump.
    pub poll_interval: Duration,

    /// What to do when the transport fails.
    pub reconnect: ReconnectPolicy,

    /// Capacity of each subscription's queue; events routed to a full queue are dropped.
    pub subscription_queue: usize,
}

impl BusConfig {
    /// Poll interval clamped to a minimum of 1ms.
    #[inline]
    pub fn poll_interval_clamped(&self) -> Duration {
        self.poll_interval.max(MIN_POLL)
    }

    /// Subscription queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn subscription_queue_clamped(&self) -> usize {
        self.subscription_queue.max(1)
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `endpoint = "local"`
    /// - `poll_interval = 250ms`
    /// - `reconnect = ReconnectPolicy::default()` (5 attempts, exponential backoff)
    /// - `subscription_queue = 4096`
    fn default() -> Self {
        Self {
            endpoint: "local".to_string(),
            poll_interval: Duration::from_millis(250),
            reconnect: ReconnectPolicy::default(),
            subscription_queue: 4096,
        }
    }
}

/// Options of one run.
///
/// ## Field semantics
/// - `saltenv`: target environment, passed as `args["saltenv"]` unless a stage sets one
/// - `test`: dry run, passed as `args["test"] = true`
/// - `exclude`: ids of fan-out stages to skip; entries are tag globs (`db-*`)
/// - `pillar`: overrides merged into `args["pillar"]`; must be a mapping
#[derive(Clone, Debug, PartialEq)]
pub struct RunOptions {
    /// Target environment.
    pub saltenv: String,
    /// Dry run.
    pub test: bool,
    /// Stage ids (or globs over them) to skip.
    pub exclude: Vec<String>,
    /// Pillar overrides.
    pub pillar: Option<Value>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            saltenv: "base".to_string(),
            test: false,
            exclude: Vec::new(),
            pillar: None,
        }
    }
}

impl RunOptions {
    /// Pillar overrides as a mapping.
    ///
    /// Fails with [`ConfigurationError::InvalidPillar`] if they are anything else.
    pub fn pillar_overrides(&self) -> Result<Option<&EventData>, ConfigurationError> {
        match &self.pillar {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(ConfigurationError::InvalidPillar),
        }
    }

    /// Compiled `exclude` entries.
    ///
    /// Fails with [`ConfigurationError::InvalidPattern`] on the first entry
    /// that is not a usable glob.
    pub fn exclude_patterns(&self) -> Result<Vec<TagPattern>, ConfigurationError> {
        self.exclude
            .iter()
            .map(|p| TagPattern::new(p).map_err(ConfigurationError::from))
            .collect()
    }

    /// Arguments to dispatch `stage` with.
    pub fn apply(&self, stage: &FanOutStage) -> Result<EventData, ConfigurationError> {
        let mut args = stage.args.clone();

        args.entry("saltenv")
            .or_insert_with(|| Value::String(self.saltenv.clone()));
        if self.test {
            args.insert("test".to_string(), Value::Bool(true));
        }

        if let Some(overrides) = self.pillar_overrides()? {
            let pillar = args
                .entry("pillar")
                .or_insert_with(|| Value::Object(EventData::new()));
            match pillar {
                Value::Object(existing) => {
                    for (k, v) in overrides {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                other => *other = Value::Object(overrides.clone()),
            }
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_timeout_means_no_deadline() {
        let cfg = RunConfig {
            job_timeout: Duration::ZERO,
            ..RunConfig::default()
        };
        assert_eq!(cfg.job_deadline(), None);
        assert_eq!(
            RunConfig::default().job_deadline(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn intervals_are_clamped() {
        let cfg = RunConfig {
            poll_interval: Duration::ZERO,
            observer_queue: 0,
            ..RunConfig::default()
        };
        assert_eq!(cfg.poll_interval_clamped(), Duration::from_millis(1));
        assert_eq!(cfg.observer_queue_clamped(), 1);

        let bus = BusConfig {
            subscription_queue: 0,
            ..BusConfig::default()
        };
        assert_eq!(bus.subscription_queue_clamped(), 1);
    }

    #[test]
    fn options_flow_into_args() {
        let stage = FanOutStage::new("web", ["w1"], "state.sls")
            .with_arg("mods", json!("nginx"))
            .with_arg("pillar", json!({"keep": 1, "port": 80}));
        let opts = RunOptions {
            test: true,
            pillar: Some(json!({"port": 8080})),
            ..RunOptions::default()
        };

        let args = opts.apply(&stage).unwrap();
        assert_eq!(args["mods"], "nginx");
        assert_eq!(args["saltenv"], "base");
        assert_eq!(args["test"], true);
        assert_eq!(args["pillar"], json!({"keep": 1, "port": 8080}));
    }

    #[test]
    fn stage_saltenv_wins() {
        let stage = FanOutStage::new("web", ["w1"], "state.sls").with_arg("saltenv", json!("dev"));
        let args = RunOptions::default().apply(&stage).unwrap();
        assert_eq!(args["saltenv"], "dev");
        assert!(!args.contains_key("test"));
    }

    #[test]
    fn pillar_must_be_a_mapping() {
        let opts = RunOptions {
            pillar: Some(json!(["not", "a", "dict"])),
            ..RunOptions::default()
        };
        assert_eq!(
            opts.pillar_overrides(),
            Err(ConfigurationError::InvalidPillar)
        );
    }

    #[test]
    fn exclusion_by_stage_id_or_glob() {
        let opts = RunOptions {
            exclude: vec!["db".into(), "cache-*".into()],
            ..RunOptions::default()
        };
        let patterns = opts.exclude_patterns().unwrap();
        let excluded = |id: &str| patterns.iter().any(|p| p.is_match(id));

        assert!(excluded("db"));
        assert!(excluded("cache-eu"));
        assert!(!excluded("web"));
        assert!(!excluded("db-replica"));
    }

    #[test]
    fn unusable_exclude_glob_is_a_configuration_error() {
        let opts = RunOptions {
            exclude: vec!["web".into(), "[z-a]".into()],
            ..RunOptions::default()
        };
        match opts.exclude_patterns() {
            Err(ConfigurationError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "[z-a]"),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }
}
