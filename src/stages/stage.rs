//! # Orchestration stages.
//!
//! A [`Stage`] is either an instruction to run something ([`FanOutStage`]) or
//! a result payload collected earlier ([`ResultStage`]).
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use stagevisor::{FanOutStage, Stage};
//!
//! let stage = Stage::FanOut(
//!     FanOutStage::new("webservers", ["web-1", "web-2"], "state.sls")
//!         .with_arg("mods", json!("nginx")),
//! );
//! assert_eq!(stage.id(), Some("webservers"));
//! assert_eq!(stage.kind(), "fan_out");
//! ```

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::error::ConfigurationError;
use crate::events::EventData;
use crate::jobs::TargetId;
use crate::results::Payload;

/// One unit of an orchestration sequence.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stage {
    /// A previously collected result payload, reported but not dispatched.
    Results(ResultStage),
    /// Apply `function` to `targets`.
    FanOut(FanOutStage),
}

impl Stage {
    /// Stage id, if the stage carries one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Stage::Results(s) => s.name.as_deref(),
            Stage::FanOut(s) => Some(&s.id),
        }
    }

    /// Stable label of the stage kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Stage::Results(_) => "results",
            Stage::FanOut(_) => "fan_out",
        }
    }

    /// Checks the stage at position `index`.
    pub fn validate(&self, index: usize) -> Result<(), ConfigurationError> {
        match self {
            Stage::Results(_) => Ok(()),
            Stage::FanOut(s) => {
                if s.targets.is_empty() {
                    return Err(ConfigurationError::EmptyTargets { index });
                }
                if s.function.trim().is_empty() {
                    return Err(ConfigurationError::EmptyFunction { index });
                }
                Ok(())
            }
        }
    }
}

/// Collected results: resources plus run metadata, split once at construction.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResultStage {
    /// Optional label for reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Classified payload.
    pub payload: Payload,
}

impl ResultStage {
    /// Wraps an already classified payload.
    pub fn new(payload: Payload) -> Self {
        Self {
            name: None,
            payload,
        }
    }

    /// Classifies a raw mapping.
    pub fn from_raw(raw: &EventData) -> Self {
        Self::new(Payload::classify(raw))
    }

    /// Sets the report label.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Instruction to run `function` with `args` on `targets`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FanOutStage {
    /// Stage id, used for exclusion and reports.
    pub id: String,
    /// Targets in declaration order.
    pub targets: Vec<TargetId>,
    /// Remote function to run (`state.sls`, `state.highstate`, ...).
    pub function: String,
    /// Keyword arguments for the function.
    pub args: EventData,
}

impl FanOutStage {
    /// Creates a stage without arguments.
    pub fn new<T>(
        id: impl Into<String>,
        targets: impl IntoIterator<Item = T>,
        function: impl Into<String>,
    ) -> Self
    where
        T: Into<TargetId>,
    {
        Self {
            id: id.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            function: function.into(),
            args: EventData::new(),
        }
    }

    /// Adds or replaces one argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Targets expected to answer, without duplicates.
    pub fn expected_targets(&self) -> BTreeSet<TargetId> {
        self.targets.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_target_set_is_a_configuration_error() {
        let stage = Stage::FanOut(FanOutStage::new("s", Vec::<&str>::new(), "state.sls"));
        assert_eq!(
            stage.validate(3),
            Err(ConfigurationError::EmptyTargets { index: 3 })
        );
    }

    #[test]
    fn blank_function_is_a_configuration_error() {
        let stage = Stage::FanOut(FanOutStage::new("s", ["w1"], "  "));
        assert_eq!(
            stage.validate(0),
            Err(ConfigurationError::EmptyFunction { index: 0 })
        );
    }

    #[test]
    fn result_stages_are_always_valid() {
        let raw = json!({"comment": "ok"});
        let stage = Stage::Results(ResultStage::from_raw(raw.as_object().unwrap()));
        assert!(stage.validate(0).is_ok());
        assert_eq!(stage.id(), None);
        assert_eq!(stage.kind(), "results");
    }

    #[test]
    fn expected_targets_are_deduplicated() {
        let s = FanOutStage::new("s", ["w2", "w1", "w2"], "test.ping");
        let expected: Vec<_> = s.expected_targets().into_iter().collect();
        assert_eq!(expected, vec![TargetId::from("w1"), TargetId::from("w2")]);
        assert_eq!(s.targets.len(), 3);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let stage = Stage::FanOut(FanOutStage::new("db", ["db-1"], "state.sls"));
        let v = serde_json::to_value(&stage).unwrap();
        assert_eq!(v["kind"], "fan_out");
        assert_eq!(v["targets"], json!(["db-1"]));
    }
}
