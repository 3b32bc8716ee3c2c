use std::cell::Cell;
use std::future::Future;

use crate::models::TaskId;

thread_local! {
    static CURRENT_TASK_ID: Cell<Option<u64>> = const { Cell::new(None) };
}

tokio::task_local! {
    static CURRENT_ASYNC_TASK_ID: TaskId;
}

/// Id of the queued task currently executing on this thread or tokio task.
pub fn current_task_id() -> Option<TaskId> {
    CURRENT_ASYNC_TASK_ID
        .try_with(|task_id| *task_id)
        .ok()
        .or_else(|| CURRENT_TASK_ID.with(|slot| slot.get().map(TaskId)))
}

/// Puts the previous id back when dropped, including while unwinding.
struct Reset(Option<u64>);

impl Drop for Reset {
    fn drop(&mut self) {
        CURRENT_TASK_ID.with(|slot| slot.set(self.0));
    }
}

pub(crate) fn with_task_id<R>(task_id: TaskId, operation: impl FnOnce() -> R) -> R {
    let _reset = Reset(CURRENT_TASK_ID.with(|slot| slot.replace(Some(task_id.0))));
    operation()
}

pub(crate) async fn scope<F: Future>(task_id: TaskId, future: F) -> F::Output {
    CURRENT_ASYNC_TASK_ID.scope(task_id, future).await
}
