use std::collections::BTreeMap;
use std::future::{Future, poll_fn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::Poll;
use std::time::SystemTime;

use tokio::sync::oneshot;

use crate::config::DetachedFailurePolicy;
use crate::models::{CoreError, ExecutionMode, QueueId, TaskHandle, TaskId};
use crate::orchestration::{Operation, OrchestrationResult};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(0);

struct QueuedTask {
    handle: TaskHandle,
    operation: Operation,
}

/// Sparse, position-ordered queue of tasks executed in a single pass.
///
/// Explicit positions are kept exactly, gaps included; tasks without a
/// position land after the highest occupied slot. `process` drains the queue
/// in ascending position order, so gaps never turn into execution steps.
pub struct TaskQueue {
    id: QueueId,
    next_task_id: u64,
    slots: BTreeMap<usize, QueuedTask>,
    dispatched: Vec<TaskId>,
    detached_failures: DetachedFailurePolicy,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_detached_failures(DetachedFailurePolicy::default())
    }

    pub fn with_detached_failures(detached_failures: DetachedFailurePolicy) -> Self {
        Self {
            id: QueueId(NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed)),
            next_task_id: 0,
            slots: BTreeMap::new(),
            dispatched: Vec::new(),
            detached_failures,
        }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn detached_failures(&self) -> DetachedFailurePolicy {
        self.detached_failures
    }

    pub fn set_detached_failures(&mut self, policy: DetachedFailurePolicy) {
        self.detached_failures = policy;
    }

    /// Queues `operation`, replacing any task already at `position`.
    ///
    /// A negative or absent position appends after the highest occupied slot.
    pub fn add(
        &mut self,
        operation: Operation,
        mode: ExecutionMode,
        position: Option<i64>,
    ) -> TaskHandle {
        let position = position
            .and_then(|requested| usize::try_from(requested).ok())
            .unwrap_or_else(|| self.append_position());

        let task_id = TaskId(self.next_task_id);
        self.next_task_id = self.next_task_id.saturating_add(1);

        let handle = TaskHandle {
            id: task_id,
            queue: self.id,
            mode,
            position,
            created_at: SystemTime::now(),
        };

        let replaced = self.slots.insert(
            position,
            QueuedTask {
                handle: handle.clone(),
                operation,
            },
        );
        if let Some(previous) = replaced {
            tracing::debug!(
                queue = self.id.0,
                position,
                replaced_task = previous.handle.id.0,
                task_id = task_id.0,
                "replaced queued task"
            );
        }

        handle
    }

    /// Removes every slot holding the task behind `handle`.
    ///
    /// Returns `Ok(false)` when the task is no longer queued.
    pub fn remove(&mut self, handle: &TaskHandle) -> OrchestrationResult<bool> {
        if handle.queue != self.id {
            return Err(CoreError::invalid_argument(format!(
                "task '{}' belongs to queue '{}', not '{}'",
                handle.id.0, handle.queue.0, self.id.0
            ))
            .for_task(handle.id));
        }

        let before = self.slots.len();
        self.slots.retain(|_, queued| queued.handle.id != handle.id);
        Ok(self.slots.len() != before)
    }

    pub fn contains(&self, handle: &TaskHandle) -> bool {
        handle.queue == self.id
            && self
                .slots
                .values()
                .any(|queued| queued.handle.id == handle.id)
    }

    /// Slot count including gaps: one past the highest occupied position.
    pub fn len(&self) -> usize {
        self.append_position()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.slots.len()
    }

    pub fn positions(&self) -> Vec<usize> {
        self.slots.keys().copied().collect()
    }

    /// Every task dispatched by this queue so far, in dispatch order.
    ///
    /// The history spans all runs and is never trimmed automatically; call
    /// `clear_dispatched` on long-lived queues.
    pub fn dispatched(&self) -> &[TaskId] {
        &self.dispatched
    }

    /// Forgets the dispatch history. Queued tasks are left untouched.
    pub fn clear_dispatched(&mut self) {
        self.dispatched.clear();
    }

    /// Drains the queue and dispatches each task in ascending position order.
    ///
    /// `Wait` tasks are awaited before moving on and their error aborts the
    /// pass; the tasks after it are dropped without running. `FireAndForget`
    /// tasks are polled once in place, then spawned if still pending, and
    /// never observed. Must be awaited on a tokio runtime.
    pub async fn process(&mut self) -> OrchestrationResult<Vec<TaskId>> {
        let slots = std::mem::take(&mut self.slots);
        let mut dispatched = Vec::with_capacity(slots.len());

        tracing::debug!(queue = self.id.0, tasks = slots.len(), "processing task queue");

        for (position, QueuedTask { handle, operation }) in slots {
            tracing::trace!(
                queue = self.id.0,
                task_id = handle.id.0,
                position,
                mode = %handle.mode,
                "dispatching task"
            );
            self.dispatched.push(handle.id);
            dispatched.push(handle.id);

            match handle.mode {
                ExecutionMode::Wait => {
                    if let Err(error) = operation.into_task_future(handle.id).await {
                        tracing::debug!(
                            queue = self.id.0,
                            task_id = handle.id.0,
                            kind = ?error.kind,
                            "waited task failed; aborting queue pass"
                        );
                        return Err(error);
                    }
                }
                ExecutionMode::FireAndForget => {
                    detach(self.id, self.detached_failures, handle.id, operation).await
                }
            }
        }

        Ok(dispatched)
    }

    fn append_position(&self) -> usize {
        self.slots
            .last_key_value()
            .map_or(0, |(position, _)| position.saturating_add(1))
    }
}

async fn detach(
    queue: QueueId,
    policy: DetachedFailurePolicy,
    task_id: TaskId,
    operation: Operation,
) {
    match operation {
        Operation::Future(start) => {
            let mut future = Operation::Future(start).into_task_future(task_id);

            // The first poll runs inline: the task's synchronous prefix has
            // executed before the next slot is dispatched.
            let first_poll = poll_fn(|context| {
                Poll::Ready(panic::catch_unwind(AssertUnwindSafe(|| {
                    future.as_mut().poll(context)
                })))
            })
            .await;

            match first_poll {
                Ok(Poll::Ready(outcome)) => report_detached(queue, policy, task_id, outcome),
                Ok(Poll::Pending) => {
                    tokio::spawn(async move {
                        report_detached(queue, policy, task_id, future.await);
                    });
                }
                Err(_) => report_detached(
                    queue,
                    policy,
                    task_id,
                    Err(CoreError::internal("fire-and-forget operation panicked").for_task(task_id)),
                ),
            }
        }
        Operation::Blocking(operation) => {
            let (started_tx, started_rx) = oneshot::channel();
            let future = Operation::blocking(move || {
                let _ = started_tx.send(());
                operation()
            })
            .into_task_future(task_id);

            tokio::spawn(async move {
                report_detached(queue, policy, task_id, future.await);
            });

            // Resume once the closure is running on the blocking pool.
            let _ = started_rx.await;
        }
    }
}

fn report_detached(
    queue: QueueId,
    policy: DetachedFailurePolicy,
    task_id: TaskId,
    outcome: OrchestrationResult<()>,
) {
    if let Err(error) = outcome
        && policy == DetachedFailurePolicy::Log
    {
        tracing::warn!(
            queue = queue.0,
            task_id = task_id.0,
            kind = ?error.kind,
            message = %error.message,
            "fire-and-forget task failed"
        );
    }
}

/// Coerces a textual position the way loosely typed callers expect: the
/// leading integer prefix counts, anything negative or non-numeric means
/// "append".
pub fn sanitize_position(raw: &str) -> Option<usize> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .find(|character: char| !character.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude: usize = digits[..end].parse().ok()?;
    if negative && magnitude != 0 {
        return None;
    }
    Some(magnitude)
}
