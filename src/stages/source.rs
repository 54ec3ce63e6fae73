//! # Stage sources.
//!
//! A [`StageSource`] hands out stages front to back, once. The executor never
//! rewinds or reorders it.

use std::collections::VecDeque;

use super::stage::Stage;
use crate::error::ConfigurationError;

/// Lazy, finite, non-restartable sequence of stages.
pub trait StageSource: Send {
    /// Next stage, or `Ok(None)` at the end of the sequence.
    fn next_stage(&mut self) -> Result<Option<Stage>, ConfigurationError>;
}

/// In-memory stage sequence.
#[derive(Clone, Debug, Default)]
pub struct StageQueue {
    stages: VecDeque<Stage>,
}

impl StageQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    pub fn push(&mut self, stage: Stage) -> &mut Self {
        self.stages.push_back(stage);
        self
    }

    /// Stages left.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when the sequence is exhausted.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl StageSource for StageQueue {
    fn next_stage(&mut self) -> Result<Option<Stage>, ConfigurationError> {
        Ok(self.stages.pop_front())
    }
}

impl From<Vec<Stage>> for StageQueue {
    fn from(stages: Vec<Stage>) -> Self {
        Self {
            stages: stages.into(),
        }
    }
}

impl FromIterator<Stage> for StageQueue {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::FanOutStage;

    #[test]
    fn drains_front_to_back() {
        let mut q: StageQueue = ["a", "b"]
            .into_iter()
            .map(|id| Stage::FanOut(FanOutStage::new(id, ["w1"], "test.ping")))
            .collect();
        assert_eq!(q.len(), 2);

        let first = q.next_stage().unwrap().unwrap();
        let second = q.next_stage().unwrap().unwrap();
        assert_eq!(first.id(), Some("a"));
        assert_eq!(second.id(), Some("b"));
        assert!(q.next_stage().unwrap().is_none());
        assert!(q.is_empty());
    }
}
