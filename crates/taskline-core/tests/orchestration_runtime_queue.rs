use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskline_core::models::{CoreError, CoreErrorKind, ExecutionMode};
use taskline_core::orchestration::{Operation, TaskQueue};
use tokio::sync::{Notify, oneshot};

type EventLog = Arc<Mutex<Vec<String>>>;

fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn record(log: &EventLog, label: &str) -> Operation {
    let log = log.clone();
    let label = label.to_string();
    Operation::future(move || async move {
        log.lock().unwrap().push(label);
        Ok(())
    })
}

fn record_after(log: &EventLog, label: &str, delay: Duration) -> Operation {
    let log = log.clone();
    let label = label.to_string();
    Operation::future(move || async move {
        tokio::time::sleep(delay).await;
        log.lock().unwrap().push(label);
        Ok(())
    })
}

#[tokio::test]
async fn explicit_positions_execute_in_ascending_order_regardless_of_insertion() {
    let log = event_log();
    let mut queue = TaskQueue::new();

    queue.add(record(&log, "p7"), ExecutionMode::Wait, Some(7));
    queue.add(record(&log, "p0"), ExecutionMode::Wait, Some(0));
    queue.add(record(&log, "p4"), ExecutionMode::Wait, Some(4));
    queue.add(record(&log, "p2"), ExecutionMode::Wait, Some(2));

    queue.process().await.unwrap();

    assert_eq!(events(&log), vec!["p0", "p2", "p4", "p7"]);
}

#[tokio::test]
async fn gaps_never_produce_execution_steps() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut queue = TaskQueue::new();
    for position in [0, 3] {
        let counter = counter.clone();
        queue.add(
            Operation::blocking(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            ExecutionMode::Wait,
            Some(position),
        );
    }
    assert_eq!(queue.len(), 4);

    let dispatched = queue.process().await.unwrap();

    assert_eq!(dispatched.len(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn leading_gaps_compact_preserving_order() {
    let log = event_log();
    let mut queue = TaskQueue::new();
    queue.add(record(&log, "five"), ExecutionMode::Wait, Some(5));
    queue.add(record(&log, "two"), ExecutionMode::Wait, Some(2));

    queue.process().await.unwrap();

    assert_eq!(events(&log), vec!["two", "five"]);
}

#[tokio::test]
async fn appended_tasks_never_land_before_higher_positions() {
    let log = event_log();
    let mut queue = TaskQueue::new();

    queue.add(record(&log, "first"), ExecutionMode::Wait, None);
    queue.add(record(&log, "pinned"), ExecutionMode::Wait, Some(6));
    let appended = queue.add(record(&log, "appended"), ExecutionMode::Wait, None);
    queue.add(record(&log, "gap"), ExecutionMode::Wait, Some(3));

    assert_eq!(appended.position, 7);
    queue.process().await.unwrap();

    assert_eq!(events(&log), vec!["first", "gap", "pinned", "appended"]);
}

#[tokio::test]
async fn re_adding_at_occupied_position_replaces_prior_task() {
    let original = Arc::new(AtomicUsize::new(0));
    let replacement = Arc::new(AtomicUsize::new(0));
    let mut queue = TaskQueue::new();

    let replaced = queue.add(
        Operation::blocking({
            let original = original.clone();
            move || {
                original.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
        ExecutionMode::Wait,
        Some(2),
    );
    queue.add(
        Operation::blocking({
            let replacement = replacement.clone();
            move || {
                replacement.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
        ExecutionMode::Wait,
        Some(2),
    );

    assert!(!queue.remove(&replaced).unwrap());
    queue.process().await.unwrap();

    assert_eq!(original.load(Ordering::SeqCst), 0);
    assert_eq!(replacement.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn removed_task_never_executes() {
    let log = event_log();
    let mut queue = TaskQueue::new();
    queue.add(record(&log, "kept"), ExecutionMode::Wait, Some(0));
    let removed = queue.add(record(&log, "removed"), ExecutionMode::Wait, Some(1));

    assert!(queue.remove(&removed).unwrap());
    assert!(!queue.remove(&removed).unwrap());
    assert_eq!(queue.positions(), vec![0]);

    queue.process().await.unwrap();

    assert_eq!(events(&log), vec!["kept"]);
}

#[tokio::test]
async fn wait_mode_blocks_until_slow_task_settles() {
    let log = event_log();
    let mut queue = TaskQueue::new();
    queue.add(
        record_after(&log, "slow", Duration::from_millis(60)),
        ExecutionMode::Wait,
        Some(0),
    );
    queue.add(record(&log, "fast"), ExecutionMode::Wait, Some(1));

    queue.process().await.unwrap();

    assert_eq!(events(&log), vec!["slow", "fast"]);
}

#[tokio::test]
async fn fire_and_forget_does_not_hold_back_the_run() {
    let log = event_log();
    let gate = Arc::new(Notify::new());
    let (done_tx, done_rx) = oneshot::channel();
    let mut queue = TaskQueue::new();

    queue.add(
        Operation::future({
            let log = log.clone();
            let gate = gate.clone();
            move || async move {
                log.lock().unwrap().push("detached:start".to_string());
                gate.notified().await;
                log.lock().unwrap().push("detached:done".to_string());
                let _ = done_tx.send(());
                Ok(())
            }
        }),
        ExecutionMode::FireAndForget,
        Some(0),
    );
    queue.add(record(&log, "waited"), ExecutionMode::Wait, Some(1));

    queue.process().await.unwrap();
    assert_eq!(events(&log), vec!["detached:start", "waited"]);

    gate.notify_one();
    tokio::time::timeout(Duration::from_secs(1), done_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(events(&log), vec!["detached:start", "waited", "detached:done"]);
}

#[tokio::test]
async fn blocking_fire_and_forget_runs_off_the_run_path() {
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let (done_tx, done_rx) = oneshot::channel();
    let mut queue = TaskQueue::new();

    queue.add(
        Operation::blocking(move || {
            release_rx.recv().unwrap();
            let _ = done_tx.send(());
            Ok(())
        }),
        ExecutionMode::FireAndForget,
        None,
    );

    tokio::time::timeout(Duration::from_secs(1), queue.process())
        .await
        .unwrap()
        .unwrap();

    release_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), done_rx)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn waited_failure_propagates_unmodified_and_stops_the_pass() {
    let log = event_log();
    let mut queue = TaskQueue::new();
    queue.add(record(&log, "before"), ExecutionMode::Wait, Some(0));
    let failing = queue.add(
        Operation::future(|| async { Err(CoreError::operation_failed("stock service down")) }),
        ExecutionMode::Wait,
        Some(1),
    );
    queue.add(record(&log, "after"), ExecutionMode::Wait, Some(2));

    let error = queue.process().await.unwrap_err();

    assert_eq!(error, CoreError::operation_failed("stock service down"));
    assert_eq!(events(&log), vec!["before"]);
    assert_eq!(queue.dispatched().last(), Some(&failing.id));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn detached_failure_is_not_surfaced() {
    let mut queue = TaskQueue::new();
    queue.add(
        Operation::future(|| async { Err(CoreError::operation_failed("ignored")) }),
        ExecutionMode::FireAndForget,
        None,
    );
    queue.add(
        Operation::blocking(|| Err(CoreError::operation_failed("also ignored"))),
        ExecutionMode::FireAndForget,
        None,
    );

    assert_eq!(queue.process().await.unwrap().len(), 2);
}

#[tokio::test]
async fn blocking_wait_panic_surfaces_as_internal_error() {
    let mut queue = TaskQueue::new();
    let handle = queue.add(
        Operation::blocking(|| panic!("corrupted cart")),
        ExecutionMode::Wait,
        None,
    );

    let error = queue.process().await.unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::Internal);
    assert_eq!(error.task, Some(handle.id));
}

#[tokio::test]
async fn queue_can_be_refilled_after_processing() {
    let log = event_log();
    let mut queue = TaskQueue::new();
    let first = queue.add(record(&log, "run1"), ExecutionMode::Wait, Some(3));
    queue.process().await.unwrap();

    let second = queue.add(record(&log, "run2"), ExecutionMode::Wait, None);
    assert_eq!(second.position, 0);
    assert_ne!(first.id, second.id);
    queue.process().await.unwrap();

    assert_eq!(events(&log), vec!["run1", "run2"]);
    assert_eq!(queue.dispatched(), &[first.id, second.id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fire_and_forget_starts_before_next_slot_on_multi_thread_runtime() {
    for _ in 0..500 {
        let log = event_log();
        let mut queue = TaskQueue::new();
        queue.add(record(&log, "f2"), ExecutionMode::FireAndForget, Some(0));
        queue.add(record(&log, "f3"), ExecutionMode::Wait, Some(1));

        queue.process().await.unwrap();

        assert_eq!(events(&log), vec!["f2", "f3"]);
    }
}

fn explode() -> Result<(), CoreError> {
    panic!("detached boom")
}

#[tokio::test]
async fn panicking_fire_and_forget_does_not_abort_the_pass() {
    let log = event_log();
    let mut queue = TaskQueue::new();
    queue.add(
        Operation::future(|| async { explode() }),
        ExecutionMode::FireAndForget,
        Some(0),
    );
    queue.add(record(&log, "after"), ExecutionMode::Wait, Some(1));

    queue.process().await.unwrap();

    assert_eq!(events(&log), vec!["after"]);
}
