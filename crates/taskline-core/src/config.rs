use serde::{Deserialize, Serialize};

use crate::models::{CoreError, ExecutionMode};
use crate::orchestration::OrchestrationResult;

/// Whether the finisher still runs after the initializer or a waited task failed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinisherPolicy {
    #[default]
    OnSuccess,
    Always,
}

/// What the queue does with the error of a fire-and-forget task.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachedFailurePolicy {
    #[default]
    Log,
    Silent,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    /// Mode used when a task is enqueued without one.
    pub default_mode: ExecutionMode,
    pub finisher_policy: FinisherPolicy,
    pub detached_failures: DetachedFailurePolicy,
}

impl HandlerConfig {
    pub fn from_json_str(raw: &str) -> OrchestrationResult<Self> {
        serde_json::from_str(raw)
            .map_err(|error| CoreError::invalid_argument(format!("invalid handler config: {error}")))
    }

    pub fn from_json_value(value: serde_json::Value) -> OrchestrationResult<Self> {
        serde_json::from_value(value)
            .map_err(|error| CoreError::invalid_argument(format!("invalid handler config: {error}")))
    }

    pub fn with_default_mode(mut self, mode: ExecutionMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_finisher_policy(mut self, policy: FinisherPolicy) -> Self {
        self.finisher_policy = policy;
        self
    }

    pub fn with_detached_failures(mut self, policy: DetachedFailurePolicy) -> Self {
        self.detached_failures = policy;
        self
    }
}
