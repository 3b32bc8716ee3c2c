use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::models::CoreError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TaskId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct QueueId(pub u64);

/// How a queued task interacts with the run's forward progress.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The run suspends until the task settles.
    Wait,
    /// The task is launched and the run moves on without observing it.
    #[default]
    FireAndForget,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::FireAndForget => "fire_and_forget",
        }
    }
}

impl Display for ExecutionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "wait" | "Wait" | "AWAIT" => Ok(Self::Wait),
            "fire_and_forget" | "FireAndForget" | "ASYNC" => Ok(Self::FireAndForget),
            other => Err(CoreError::invalid_mode(format!(
                "invalid execution mode '{other}'"
            ))),
        }
    }
}

/// Handle returned by `add`; the only way to remove a queued task later.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskHandle {
    pub id: TaskId,
    pub queue: QueueId,
    pub mode: ExecutionMode,
    pub position: usize,
    pub created_at: SystemTime,
}
