pub mod handler;
pub mod operation;
pub mod runtime_queue;

pub use handler::{Handler, RunPhase};
pub use operation::{Hook, Operation, OperationFuture};
pub use runtime_queue::{TaskQueue, sanitize_position};

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;
