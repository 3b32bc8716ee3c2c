use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::models::{CoreError, TaskId};
use crate::orchestration::OrchestrationResult;
use crate::task_context;

pub type OperationFuture = Pin<Box<dyn Future<Output = OrchestrationResult<()>> + Send>>;

pub type FutureFn = Box<dyn FnOnce() -> OperationFuture + Send>;
pub type BlockingFn = Box<dyn FnOnce() -> OrchestrationResult<()> + Send>;

/// A single unit of queued work.
///
/// Asynchronous operations are polled on the runtime; blocking ones are moved
/// to the blocking pool so a slow synchronous closure never stalls the run.
pub enum Operation {
    Future(FutureFn),
    Blocking(BlockingFn),
}

impl Operation {
    pub fn future<F, Fut>(operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = OrchestrationResult<()>> + Send + 'static,
    {
        Self::Future(Box::new(move || Box::pin(operation()) as OperationFuture))
    }

    pub fn blocking<F>(operation: F) -> Self
    where
        F: FnOnce() -> OrchestrationResult<()> + Send + 'static,
    {
        Self::Blocking(Box::new(operation))
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }

    pub(crate) fn into_task_future(self, task_id: TaskId) -> OperationFuture {
        match self {
            Self::Future(operation) => Box::pin(task_context::scope(task_id, operation())),
            Self::Blocking(operation) => Box::pin(async move {
                tokio::task::spawn_blocking(move || task_context::with_task_id(task_id, operation))
                    .await
                    .map_err(|join_error| {
                        tracing::error!(
                            task_id = task_id.0,
                            error = %join_error,
                            "blocking operation did not complete"
                        );
                        CoreError::internal(format!("blocking operation join failure: {join_error}"))
                            .for_task(task_id)
                    })?
            }),
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Future(_) => f.write_str("Operation::Future"),
            Self::Blocking(_) => f.write_str("Operation::Blocking"),
        }
    }
}

pub type HookFutureFn = Arc<dyn Fn() -> OperationFuture + Send + Sync>;
pub type HookBlockingFn = Arc<dyn Fn() -> OrchestrationResult<()> + Send + Sync>;

/// Initializer or finisher; invoked once per run, so it must be reusable.
#[derive(Clone)]
pub enum Hook {
    Future(HookFutureFn),
    Blocking(HookBlockingFn),
}

impl Hook {
    pub fn future<F, Fut>(hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OrchestrationResult<()>> + Send + 'static,
    {
        Self::Future(Arc::new(move || Box::pin(hook()) as OperationFuture))
    }

    pub fn blocking<F>(hook: F) -> Self
    where
        F: Fn() -> OrchestrationResult<()> + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(hook))
    }

    pub(crate) async fn invoke(&self) -> OrchestrationResult<()> {
        match self {
            Self::Future(hook) => hook().await,
            Self::Blocking(hook) => {
                let hook = hook.clone();
                tokio::task::spawn_blocking(move || hook())
                    .await
                    .map_err(|join_error| {
                        tracing::error!(error = %join_error, "blocking hook did not complete");
                        CoreError::internal(format!("blocking hook join failure: {join_error}"))
                    })?
            }
        }
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Future(_) => f.write_str("Hook::Future"),
            Self::Blocking(_) => f.write_str("Hook::Blocking"),
        }
    }
}
