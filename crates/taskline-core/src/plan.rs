//! JSON run plans: a list of named steps resolved against an
//! [`OperationRegistry`] and loaded into a [`Handler`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HandlerConfig;
use crate::models::{CoreError, ExecutionMode, TaskHandle};
use crate::orchestration::{Handler, OrchestrationResult, sanitize_position};
use crate::registry::OperationRegistry;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    #[serde(default)]
    pub config: Option<HandlerConfig>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    /// Number, numeric string, or anything else (treated as "append").
    #[serde(default)]
    pub position: Value,
    #[serde(default)]
    pub args: Value,
}

impl RunPlan {
    pub fn from_json_str(raw: &str) -> OrchestrationResult<Self> {
        serde_json::from_str(raw)
            .map_err(|error| CoreError::invalid_argument(format!("invalid run plan: {error}")))
    }

    /// Builds a handler configured from the plan (defaults when absent).
    pub fn handler(&self) -> Handler {
        Handler::with_config(self.config.unwrap_or_default())
    }

    /// Resolves every step and adds it to `handler`, in plan order.
    ///
    /// Stops at the first invalid step; steps before it stay queued.
    pub fn load_into(
        &self,
        handler: &mut Handler,
        registry: &OperationRegistry,
    ) -> OrchestrationResult<Vec<TaskHandle>> {
        let mut handles = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let name = step.operation.as_deref().ok_or_else(|| {
                CoreError::invalid_operation(format!("step {index} does not name an operation"))
            })?;
            let mode = match step.mode.as_deref() {
                Some(raw) => raw.parse::<ExecutionMode>()?,
                None => handler.config().default_mode,
            };
            let operation = registry.resolve(name, &step.args)?;
            let position = coerce_position(&step.position);

            tracing::trace!(step = index, operation = name, %mode, ?position, "loading plan step");
            handles.push(handler.add(operation, mode, position));
        }
        Ok(handles)
    }
}

/// Integer position for a loosely typed JSON value; `None` means append.
pub fn coerce_position(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && *float >= 0.0 && *float < i64::MAX as f64)
                .map(|float| float.trunc() as i64)
        }),
        Value::String(raw) => sanitize_position(raw).and_then(|position| i64::try_from(position).ok()),
        _ => None,
    }
}
