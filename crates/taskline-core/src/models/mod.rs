pub mod error;
pub mod task;

pub use error::{CoreError, CoreErrorKind};
pub use task::{ExecutionMode, QueueId, TaskHandle, TaskId};
