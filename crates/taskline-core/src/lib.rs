pub mod config;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod plan;
pub mod registry;
pub(crate) mod task_context;

pub use config::{DetachedFailurePolicy, FinisherPolicy, HandlerConfig};
pub use models::{CoreError, CoreErrorKind, ExecutionMode, TaskHandle, TaskId};
pub use orchestration::{Handler, Hook, Operation, OrchestrationResult, RunPhase, TaskQueue};
pub use plan::RunPlan;
pub use registry::OperationRegistry;
pub use task_context::current_task_id;
