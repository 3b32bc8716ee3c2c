use thiserror::Error;

use crate::models::TaskId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    InvalidOperation,
    InvalidMode,
    InvalidArgument,
    OperationFailed,
    HookFailed,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub task: Option<TaskId>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            task: None,
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::InvalidOperation, message)
    }

    pub fn invalid_mode(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::InvalidMode, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::InvalidArgument, message)
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::OperationFailed, message)
    }

    pub fn hook_failed(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::HookFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Internal, message)
    }

    /// Attaches `task` unless the error already names one.
    pub fn for_task(mut self, task: TaskId) -> Self {
        self.task = self.task.or(Some(task));
        self
    }
}
